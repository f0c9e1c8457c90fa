//! User-interrupt abstraction: wait for a named kernel event (or a
//! synthetic in-process one) and dispatch callbacks.

mod dummy;
mod pcie;
mod petalinux;

pub use dummy::DummyUserInterrupt;
pub use pcie::PcieUserInterrupt;
pub use petalinux::PetaLinuxUserInterrupt;

use std::sync::{Arc, Mutex};

use crate::error::{ClapError, Result};
use crate::register::HasInterrupt;

pub type InterruptCallback = Box<dyn Fn(u32) + Send + Sync>;
/// Runs after the ordinary callback chain; returning `true` marks the
/// owning IP core as finished for watchdogs driven in interrupt mode.
pub type FinishCallback = Box<dyn FnMut(u32) -> bool + Send>;

/// Capability-bearing handle over a single device interrupt source.
///
/// Implemented by the PCIe (`/dev/xdma<N>_events_<K>`), PetaLinux
/// (`/dev/uio<K>`), AXI-INTC-synthetic and Dummy variants. Waiting on an
/// uninitialized handle is an error rather than undefined behavior.
pub trait UserInterrupt: Send {
    fn init(&mut self, dev_num: u32, interrupt_num: u32, status: Option<Arc<Mutex<dyn HasInterrupt + Send>>>) -> Result<()>;

    fn unset(&mut self) {}

    fn is_set(&self) -> bool;

    /// Blocks until an interrupt is observed or `timeout_ms` elapses
    /// (`WAIT_INFINITE` blocks forever). Returns `Ok(true)` if an
    /// interrupt fired, `Ok(false)` on timeout.
    fn wait_for_interrupt(&mut self, timeout_ms: i32, run_callbacks: bool) -> Result<bool>;

    fn register_callback(&mut self, callback: InterruptCallback);

    fn set_finish_callback(&mut self, callback: FinishCallback);

    fn ip_core_finished(&self) -> bool {
        false
    }

    fn last_interrupt(&self) -> u32 {
        0
    }
}

/// Shared bookkeeping every concrete [`UserInterrupt`] impl needs:
/// callback list, status-register back-reference, last-seen mask, and the
/// finished flag fed by the IP-finish callback.
pub(crate) struct InterruptState {
    pub status: Option<Arc<Mutex<dyn HasInterrupt + Send>>>,
    pub callbacks: Vec<InterruptCallback>,
    pub finish_callback: Option<FinishCallback>,
    pub last_interrupt: u32,
    pub ip_core_finished: bool,
    pub is_set: bool,
}

impl Default for InterruptState {
    fn default() -> Self {
        Self {
            status: None,
            callbacks: Vec::new(),
            finish_callback: None,
            last_interrupt: 0,
            ip_core_finished: false,
            is_set: false,
        }
    }
}

impl InterruptState {
    /// Shared tail of `wait_for_interrupt`: acknowledge the status
    /// register (if any), run the callback chain, then the finish
    /// callback.
    pub(crate) fn run_callbacks(&mut self, mask: u32, run_callbacks: bool) {
        if let Some(status) = &self.status {
            let mut guard = status.lock().unwrap();
            guard.clear_interrupts();
            self.last_interrupt = guard.get_last_interrupt();
        } else {
            self.last_interrupt = mask;
        }

        if !run_callbacks {
            return;
        }

        for cb in &self.callbacks {
            cb(self.last_interrupt);
        }

        if let Some(finish) = &mut self.finish_callback {
            if finish(self.last_interrupt) {
                self.ip_core_finished = true;
            }
        }
    }

    pub(crate) fn require_set(&self) -> Result<()> {
        if !self.is_set {
            return Err(ClapError::UserInterrupt("wait on an uninitialized UserInterrupt".into()));
        }
        Ok(())
    }
}
