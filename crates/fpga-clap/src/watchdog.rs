//! Worker-thread coordinator: waits on an interrupt or polls a status
//! register, records a runtime, and lets the caller observe completion
//! and any exception raised on the worker.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::constants::WAIT_INFINITE;
use crate::error::{ClapError, Result};
use crate::interrupt::UserInterrupt;
use crate::register::HasStatus;
use crate::timer::Timer;

type SharedInterrupt = Arc<Mutex<Box<dyn UserInterrupt>>>;
type SharedStatus = Arc<Mutex<Option<Box<dyn HasStatus + Send>>>>;
/// Invoked once per worker pass, in both interrupt and polling mode;
/// returns `true` once the owning IP core is considered finished (AXI
/// DMA uses this to advance its chunk queue regardless of which mode
/// the channel is being watched in).
type SharedFinish = Arc<Mutex<Option<Box<dyn FnMut() -> bool + Send>>>>;

/// Owns one [`UserInterrupt`], optionally a status-register
/// back-reference, a timer, a worker thread, and a condvar+flag pair used
/// to signal completion.
///
/// There is no global `exception_ptr` in this port: a worker-thread error
/// is stashed in a `Mutex<Option<ClapError>>` slot and surfaced from the
/// next [`WatchDog::wait_for_finish`] call, rather than the source's
/// process-wide static.
pub struct WatchDog {
    name: String,
    interrupt: SharedInterrupt,
    status: SharedStatus,
    thread: Option<JoinHandle<()>>,
    thread_running: bool,
    pair: Arc<(Mutex<bool>, Condvar)>,
    timer: Arc<Mutex<Timer>>,
    error: Arc<Mutex<Option<ClapError>>>,
    finish: SharedFinish,
}

impl WatchDog {
    pub fn new(name: impl Into<String>, interrupt: Box<dyn UserInterrupt>) -> Self {
        Self {
            name: name.into(),
            interrupt: Arc::new(Mutex::new(interrupt)),
            status: Arc::new(Mutex::new(None)),
            thread: None,
            thread_running: false,
            pair: Arc::new((Mutex::new(false), Condvar::new())),
            timer: Arc::new(Mutex::new(Timer::new())),
            error: Arc::new(Mutex::new(None)),
            finish: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_status_register(&self, status: Box<dyn HasStatus + Send>) {
        *self.status.lock().unwrap() = Some(status);
    }

    pub fn unset_status_register(&self) {
        *self.status.lock().unwrap() = None;
    }

    /// Installs a callback run once the worker observes completion,
    /// regardless of whether it got there by waiting on an interrupt or
    /// by polling the status register.
    pub fn set_finish_callback(&self, callback: impl FnMut() -> bool + Send + 'static) {
        *self.finish.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn clear_finish_callback(&self) {
        *self.finish.lock().unwrap() = None;
    }

    pub fn register_interrupt_callback(&self, callback: crate::interrupt::InterruptCallback) {
        self.interrupt.lock().unwrap().register_callback(callback);
    }

    pub fn is_running(&self) -> bool {
        self.thread_running
    }

    /// Spawns the worker. Fails if already running, or if neither the
    /// interrupt nor a status register is set.
    pub fn start(&mut self) -> Result<()> {
        if self.thread_running {
            return Err(ClapError::WatchDog(format!("{}: already running", self.name)));
        }

        let interrupt_is_set = self.interrupt.lock().unwrap().is_set();
        let has_status = self.status.lock().unwrap().is_some();
        if !interrupt_is_set && !has_status {
            return Err(ClapError::WatchDog(format!(
                "{}: trying to start with neither the interrupt nor the status register set",
                self.name
            )));
        }

        *self.error.lock().unwrap() = None;
        *self.pair.0.lock().unwrap() = false;

        let interrupt = self.interrupt.clone();
        let status = self.status.clone();
        let pair = self.pair.clone();
        let timer = self.timer.clone();
        let error = self.error.clone();
        let finish = self.finish.clone();
        let name = self.name.clone();

        self.thread = Some(std::thread::spawn(move || {
            timer.lock().unwrap().start();

            // Repeats the wait-or-poll pass as long as the finish callback
            // reports "not yet finished" — this is what lets a multi-chunk
            // AXI DMA transfer stay on one worker across several hardware
            // completions instead of restarting the watchdog per chunk.
            // Callers with no finish callback (AXI INTC, ApCtrl) run the
            // original single pass.
            let result: Result<()> = (|| loop {
                let is_set = interrupt.lock().unwrap().is_set();
                if is_set {
                    tracing::debug!(target: "fpga_clap::watchdog", core = %name, "Interrupt Mode ...");
                    interrupt.lock().unwrap().wait_for_interrupt(WAIT_INFINITE, true)?;
                } else if status.lock().unwrap().is_some() {
                    tracing::debug!(target: "fpga_clap::watchdog", core = %name, "Polling Mode ...");
                    loop {
                        let done = status.lock().unwrap().as_mut().map(|s| s.poll_done()).unwrap_or(true);
                        if done {
                            break;
                        }
                        std::thread::sleep(Duration::from_micros(1));
                    }
                }

                let keep_going = match finish.lock().unwrap().as_mut() {
                    Some(cb) => !cb(),
                    None => false,
                };
                if !keep_going {
                    break Ok(());
                }
            })();

            if let Err(e) = result {
                *error.lock().unwrap() = Some(e);
            }

            timer.lock().unwrap().stop();

            let (lock, cvar) = &*pair;
            let mut done = lock.lock().unwrap();
            *done = true;
            cvar.notify_one();

            tracing::debug!(target: "fpga_clap::watchdog", core = %name, "Finished");
        }));

        self.thread_running = true;
        Ok(())
    }

    /// Returns `true` once the worker has joined. For `WAIT_INFINITE`,
    /// waits in 1 ms condvar slices; for a finite timeout, waits once and
    /// returns `false` (without joining) if it elapses first.
    pub fn wait_for_finish(&mut self, timeout_ms: i32) -> Result<bool> {
        if !self.thread_running {
            return Ok(false);
        }

        let (lock, cvar) = &*self.pair;
        {
            let done = lock.lock().unwrap();
            if *done {
                self.join_and_check()?;
                return Ok(true);
            }
        }

        if timeout_ms == WAIT_INFINITE {
            loop {
                let done = lock.lock().unwrap();
                let (done, _timeout) = cvar.wait_timeout(done, Duration::from_millis(1)).unwrap();
                if *done {
                    break;
                }
            }
        } else {
            let done = lock.lock().unwrap();
            let (done, timeout) = cvar.wait_timeout(done, Duration::from_millis(timeout_ms.max(0) as u64)).unwrap();
            if timeout.timed_out() && !*done {
                return Ok(false);
            }
        }

        self.join_and_check()?;
        Ok(true)
    }

    fn join_and_check(&mut self) -> Result<()> {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                *self.error.lock().unwrap() = Some(ClapError::WatchDog(format!("{}: worker thread panicked", self.name)));
            }
        }
        self.thread_running = false;
        self.check_exception()
    }

    fn check_exception(&self) -> Result<()> {
        if let Some(err) = self.error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(())
    }

    pub fn get_runtime_ms(&self) -> f64 {
        self.timer.lock().unwrap().elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::HasStatus;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct AlwaysDone(Arc<AtomicBool>);
    impl HasStatus for AlwaysDone {
        fn poll_done(&mut self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn start_without_interrupt_or_status_fails() {
        let mut wd = WatchDog::new("test", Box::new(crate::interrupt::DummyUserInterrupt::new()));
        assert!(wd.start().is_err());
    }

    #[test]
    fn polling_mode_finishes_once_status_reports_done() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut wd = WatchDog::new("test", Box::new(crate::interrupt::DummyUserInterrupt::new()));
        wd.set_status_register(Box::new(AlwaysDone(flag.clone())));
        wd.start().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        flag.store(true, Ordering::SeqCst);

        assert!(wd.wait_for_finish(WAIT_INFINITE).unwrap());
    }

    #[test]
    fn finite_timeout_returns_false_without_joining() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut wd = WatchDog::new("test", Box::new(crate::interrupt::DummyUserInterrupt::new()));
        wd.set_status_register(Box::new(AlwaysDone(flag.clone())));
        wd.start().unwrap();

        assert!(!wd.wait_for_finish(5).unwrap());
        flag.store(true, Ordering::SeqCst);
        assert!(wd.wait_for_finish(WAIT_INFINITE).unwrap());
    }
}
