//! AXI Interrupt Controller: demultiplexes one shared hardware interrupt
//! line into per-bit virtual interrupts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::constants::WAIT_INFINITE;
use crate::device::Device;
use crate::error::{ClapError, Result};
use crate::interrupt::{FinishCallback, InterruptCallback, InterruptState, UserInterrupt};
use crate::register::HasInterrupt;
use crate::register_control::RegisterControlBase;

const ISR: u64 = 0x00;
const IPR: u64 = 0x04;
const IER: u64 = 0x08;
const IAR: u64 = 0x0C;
const SIE: u64 = 0x10;
const CIE: u64 = 0x14;
const IVR: u64 = 0x18;
const MER: u64 = 0x1C;
const IMR: u64 = 0x20;
const ILR: u64 = 0x24;

const MER_ME: u64 = 1 << 0;
const MER_HIE: u64 = 1 << 1;

#[derive(Default)]
struct SyntheticShared {
    occurred: Mutex<bool>,
    cvar: Condvar,
    inner: Mutex<InterruptState>,
}

/// Synthetic in-process `UserInterrupt`, fed by
/// [`AxiInterruptController::core_interrupt_triggered`] rather than a
/// kernel event file. Lets any IP behind an AXI INTC be driven by code
/// (e.g. a [`crate::watchdog::WatchDog`]) that only knows the generic
/// `UserInterrupt` interface.
pub struct AxiIntCtrlUserInterrupt {
    shared: Arc<SyntheticShared>,
}

impl AxiIntCtrlUserInterrupt {
    fn trigger(&self, mask: u32) {
        let mut occurred = self.shared.occurred.lock().unwrap();
        self.shared.inner.lock().unwrap().last_interrupt = mask;
        *occurred = true;
        self.shared.cvar.notify_all();
    }
}

impl UserInterrupt for AxiIntCtrlUserInterrupt {
    fn init(&mut self, _dev_num: u32, _interrupt_num: u32, status: Option<Arc<Mutex<dyn HasInterrupt + Send>>>) -> Result<()> {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.status = status;
        inner.is_set = true;
        Ok(())
    }

    fn unset(&mut self) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.is_set = false;
        inner.status = None;
    }

    fn is_set(&self) -> bool {
        self.shared.inner.lock().unwrap().is_set
    }

    fn wait_for_interrupt(&mut self, timeout_ms: i32, run_callbacks: bool) -> Result<bool> {
        self.shared.inner.lock().unwrap().require_set()?;

        let mut occurred = self.shared.occurred.lock().unwrap();
        if timeout_ms == WAIT_INFINITE {
            while !*occurred {
                occurred = self.shared.cvar.wait(occurred).unwrap();
            }
        } else {
            let (guard, timeout) = self
                .shared
                .cvar
                .wait_timeout(occurred, Duration::from_millis(timeout_ms.max(0) as u64))
                .unwrap();
            occurred = guard;
            if timeout.timed_out() && !*occurred {
                return Ok(false);
            }
        }
        *occurred = false;
        drop(occurred);

        let mask = self.shared.inner.lock().unwrap().last_interrupt;
        self.shared.inner.lock().unwrap().run_callbacks(mask, run_callbacks);
        Ok(true)
    }

    fn register_callback(&mut self, callback: InterruptCallback) {
        self.shared.inner.lock().unwrap().callbacks.push(callback);
    }

    fn set_finish_callback(&mut self, callback: FinishCallback) {
        self.shared.inner.lock().unwrap().finish_callback = Some(callback);
    }

    fn ip_core_finished(&self) -> bool {
        self.shared.inner.lock().unwrap().ip_core_finished
    }

    fn last_interrupt(&self) -> u32 {
        self.shared.inner.lock().unwrap().last_interrupt
    }
}

/// ISR/IPR/IER/IAR/SIE/CIE/IVR/MER/IMR/ILR register file. Owns the single
/// `UserInterrupt` that talks to the kernel and a bit-indexed table of
/// per-source callbacks used both directly and via
/// [`AxiInterruptController::make_user_interrupt`].
pub struct AxiInterruptController {
    ctrl: RegisterControlBase,
    hw_interrupt: Mutex<Option<Box<dyn UserInterrupt>>>,
    callbacks: Mutex<HashMap<u32, InterruptCallback>>,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AxiInterruptController {
    pub fn new(device: &Arc<Device>, ctrl_base_offset: u64, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            ctrl: RegisterControlBase::new(device, ctrl_base_offset, name),
            hw_interrupt: Mutex::new(None),
            callbacks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
        })
    }

    pub fn register_intr_callback(&self, bit: u32, callback: InterruptCallback) {
        self.callbacks.lock().unwrap().insert(bit, callback);
    }

    /// Hands back a synthetic `UserInterrupt` wired to fire whenever this
    /// controller's demux observes `bit` set, so an IP core behind this
    /// INTC can be driven exactly like one with its own kernel event file.
    pub fn make_user_interrupt(&self, bit: u32) -> Box<dyn UserInterrupt> {
        let shared = Arc::new(SyntheticShared::default());
        let trigger_handle = AxiIntCtrlUserInterrupt { shared: shared.clone() };
        self.register_intr_callback(bit, Box::new(move |mask| trigger_handle.trigger(mask)));
        Box::new(AxiIntCtrlUserInterrupt { shared })
    }

    /// Initializes the shared hardware interrupt (auto-detected via UIO
    /// unless `event_no` is given), enables it, and starts the background
    /// demux thread.
    pub fn start(self: &Arc<Self>, event_no: Option<u32>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ClapError::IpCore { core: "AxiInterruptController", detail: "already started".into() });
        }

        let id = event_no.or_else(|| self.ctrl.detect_interrupt_id()).ok_or_else(|| ClapError::IpCore {
            core: "AxiInterruptController",
            detail: "no interrupt id supplied or auto-detected".into(),
        })?;

        let device = self.ctrl_device()?;
        let mut iu = device.backend().make_user_interrupt();
        iu.init(self.ctrl.get_dev_num()?, id, None)?;
        *self.hw_interrupt.lock().unwrap() = Some(iu);

        self.ctrl.write_register_raw(MER, MER_ME | MER_HIE, 4, false)?;

        let this = self.clone();
        *self.thread.lock().unwrap() = Some(std::thread::spawn(move || this.demux_loop()));
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        *self.hw_interrupt.lock().unwrap() = None;
        Ok(())
    }

    fn ctrl_device(&self) -> Result<Arc<Device>> {
        self.ctrl.device_handle()
    }

    /// Polls the shared interrupt in bounded slices so `stop()` can join
    /// promptly (the original blocks forever on one dedicated thread for
    /// the device's whole lifetime; a kernel event fd can't otherwise be
    /// interrupted from outside).
    fn demux_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let fired = {
                let mut guard = self.hw_interrupt.lock().unwrap();
                match guard.as_mut() {
                    Some(iu) => iu.wait_for_interrupt(100, false),
                    None => break,
                }
            };
            match fired {
                Ok(true) => {
                    if let Err(e) = self.core_interrupt_triggered(None) {
                        tracing::warn!(target: "fpga_clap::intc", error = %e, "demux failed");
                    }
                }
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(target: "fpga_clap::intc", error = %e, "wait_for_interrupt failed, stopping demux");
                    break;
                }
            }
        }
    }

    /// Services one hardware event: either a single `explicit_bit` (the
    /// vector-interrupt path, driven by `IVR`) or, if `None`, every bit
    /// set in `ISR`, LSB-first. Each serviced bit's callback runs before
    /// its own `IAR` acknowledge is written — no prior-call ack state is
    /// retained, so nothing from an earlier call can be re-acknowledged.
    pub fn core_interrupt_triggered(&self, explicit_bit: Option<u32>) -> Result<()> {
        let bits: Vec<u32> = match explicit_bit {
            Some(b) => vec![b],
            None => {
                let isr = self.ctrl.read_register_raw(ISR, 4)? as u32;
                (0..32).filter(|b| isr & (1 << b) != 0).collect()
            }
        };

        for bit in bits {
            if let Some(cb) = self.callbacks.lock().unwrap().get(&bit) {
                cb(1 << bit);
            }
            self.ctrl.write_register_raw(IAR, 1u64 << bit, 4, false)?;
        }
        Ok(())
    }

    pub fn enable_interrupt(&self, bit: u32) -> Result<()> {
        self.ctrl.write_register_raw(SIE, 1u64 << bit, 4, false)
    }

    pub fn disable_interrupt(&self, bit: u32) -> Result<()> {
        self.ctrl.write_register_raw(CIE, 1u64 << bit, 4, false)
    }

    pub fn pending(&self) -> Result<u32> {
        Ok(self.ctrl.read_register_raw(IPR, 4)? as u32)
    }

    pub fn enabled_mask(&self) -> Result<u32> {
        Ok(self.ctrl.read_register_raw(IER, 4)? as u32)
    }

    pub fn last_vector(&self) -> Result<u32> {
        Ok(self.ctrl.read_register_raw(IVR, 4)? as u32)
    }

    pub fn set_mode(&self, mode_mask: u32) -> Result<()> {
        self.ctrl.write_register_raw(IMR, mode_mask as u64, 4, false)
    }

    pub fn set_level(&self, level_mask: u32) -> Result<()> {
        self.ctrl.write_register_raw(ILR, level_mask as u64, 4, false)
    }

    /// Acknowledge-all then reset every register; `ILR` resets to
    /// all-ones (level-triggered inputs assumed unless reconfigured).
    pub fn reset(&self) -> Result<()> {
        self.ctrl.write_register_raw(IAR, 0xFFFF_FFFF, 4, false)?;
        for offset in [ISR, IPR, IER, SIE, CIE, IVR, MER, IMR] {
            self.ctrl.write_register_raw(offset, 0, 4, false)?;
        }
        self.ctrl.write_register_raw(ILR, 0xFFFF_FFFF, 4, false)
    }

    /// Test-only: lets a Dummy-backed scenario seed `ISR` directly.
    pub fn poke_isr(&self, value: u32) -> Result<()> {
        self.ctrl.write_register_raw(ISR, value as u64, 4, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, DummyBackend};
    use std::sync::atomic::AtomicU32;

    #[test]
    fn demux_invokes_callback_and_acks_bit() {
        let device = Device::new_unlocked(Backend::Dummy(DummyBackend::new_pcie()));
        let intc = AxiInterruptController::new(&device, 0x4000, "intc0");

        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = fired.clone();
        intc.register_intr_callback(0, Box::new(move |mask| {
            fired_clone.store(mask, Ordering::SeqCst);
        }));

        intc.poke_isr(0x1).unwrap();
        intc.core_interrupt_triggered(Some(0)).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(intc.ctrl.read_register_raw(IAR, 4).unwrap(), 1);
    }

    #[test]
    fn full_isr_scan_walks_bits_lsb_first() {
        let device = Device::new_unlocked(Backend::Dummy(DummyBackend::new_pcie()));
        let intc = AxiInterruptController::new(&device, 0x4000, "intc0");

        let order = Arc::new(Mutex::new(Vec::new()));
        for bit in [0u32, 2, 5] {
            let order = order.clone();
            intc.register_intr_callback(bit, Box::new(move |mask| order.lock().unwrap().push(mask.trailing_zeros())));
        }

        intc.poke_isr((1 << 0) | (1 << 2) | (1 << 5)).unwrap();
        intc.core_interrupt_triggered(None).unwrap();

        assert_eq!(*order.lock().unwrap(), vec![0, 2, 5]);
    }
}
