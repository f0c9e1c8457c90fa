//! HLS `ap_ctrl_hs` block control: the standard start/done/idle/ready
//! handshake Vivado HLS generates for any IP core synthesized from C/C++,
//! plus its optional global/per-source interrupt enable.

use std::sync::Arc;

use crate::device::Device;
use crate::error::Result;
use crate::register::HasStatus;
use crate::register_control::RegisterControlBase;
use crate::watchdog::WatchDog;

const AP_CTRL: u64 = 0x00;
const GIER: u64 = 0x04;
const IER: u64 = 0x08;
const ISR: u64 = 0x0C;

const AP_START: u32 = 1 << 0;
const AP_DONE: u32 = 1 << 1;
const AP_IDLE: u32 = 1 << 2;
const AP_READY: u32 = 1 << 3;
const AUTO_RESTART: u32 = 1 << 7;

const GIER_GIE: u32 = 1 << 0;

/// Polls `ap_ctrl.ap_done` for the [`WatchDog`], acknowledging by
/// re-reading (the bit self-clears once observed, per HLS convention).
struct ApDonePoll {
    ctrl: RegisterControlBase,
}

impl HasStatus for ApDonePoll {
    fn poll_done(&mut self) -> bool {
        self.ctrl.read_register_raw(AP_CTRL, 4).map(|v| v as u32 & AP_DONE != 0).unwrap_or(true)
    }
}

/// Drives one HLS block's `ap_start`/`ap_done`/`ap_idle`/`ap_ready`
/// handshake. Has its own polling [`WatchDog`] rather than the shared
/// interrupt path any AXI-INTC-backed core would use, since most
/// `ap_ctrl_hs` deployments run uninterrupted.
pub struct ApCtrl {
    ctrl: RegisterControlBase,
    watchdog: std::sync::Mutex<WatchDog>,
}

impl ApCtrl {
    pub fn new(device: &Arc<Device>, ctrl_base_offset: u64, name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            ctrl: RegisterControlBase::new(device, ctrl_base_offset, name.clone()),
            watchdog: std::sync::Mutex::new(WatchDog::new(name, Box::new(crate::interrupt::DummyUserInterrupt::new()))),
        })
    }

    pub fn is_idle(&self) -> Result<bool> {
        Ok(self.ctrl.read_register_raw(AP_CTRL, 4)? as u32 & AP_IDLE != 0)
    }

    pub fn is_done(&self) -> Result<bool> {
        Ok(self.ctrl.read_register_raw(AP_CTRL, 4)? as u32 & AP_DONE != 0)
    }

    pub fn is_ready(&self) -> Result<bool> {
        Ok(self.ctrl.read_register_raw(AP_CTRL, 4)? as u32 & AP_READY != 0)
    }

    pub fn set_auto_restart(&self, enable: bool) -> Result<()> {
        let mut v = self.ctrl.read_register_raw(AP_CTRL, 4)? as u32;
        if enable {
            v |= AUTO_RESTART;
        } else {
            v &= !AUTO_RESTART;
        }
        self.ctrl.write_register_raw(AP_CTRL, v as u64, 4, false)
    }

    /// Pulses `ap_start` and arms a polling watchdog on `ap_done`.
    pub fn start(&self) -> Result<()> {
        self.ctrl.write_register_raw(AP_CTRL, AP_START as u64, 4, false)?;

        let mut wd = self.watchdog.lock().unwrap();
        if wd.is_running() {
            return Ok(());
        }
        wd.unset_status_register();
        wd.clear_finish_callback();
        wd.set_status_register(Box::new(ApDonePoll {
            ctrl: RegisterControlBase::new(&self.ctrl.device_handle()?, self.ctrl.ctrl_base_offset(), "ap_ctrl.done"),
        }));
        wd.start()
    }

    pub fn wait_for_finish(&self, timeout_ms: i32) -> Result<bool> {
        self.watchdog.lock().unwrap().wait_for_finish(timeout_ms)
    }

    pub fn enable_interrupts(&self) -> Result<()> {
        self.ctrl.write_register_raw(GIER, GIER_GIE as u64, 4, false)?;
        self.ctrl.write_register_raw(IER, (AP_DONE | AP_READY) as u64, 4, false)
    }

    pub fn disable_interrupts(&self) -> Result<()> {
        self.ctrl.write_register_raw(GIER, 0, 4, false)
    }

    pub fn interrupt_status(&self) -> Result<u32> {
        Ok(self.ctrl.read_register_raw(ISR, 4)? as u32)
    }

    pub fn ack_interrupts(&self, mask: u32) -> Result<()> {
        self.ctrl.write_register_raw(ISR, mask as u64, 4, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, DummyBackend};

    #[test]
    fn start_sets_ap_start_bit() {
        let device = Device::new_unlocked(Backend::Dummy(DummyBackend::new_pcie()));
        let ap = ApCtrl::new(&device, 0x3000, "hls0");
        ap.start().unwrap();
        let v = ap.ctrl.read_register_raw(AP_CTRL, 4).unwrap() as u32;
        assert_eq!(v & AP_START, AP_START);
    }

    #[test]
    fn auto_restart_flag_round_trips() {
        let device = Device::new_unlocked(Backend::Dummy(DummyBackend::new_pcie()));
        let ap = ApCtrl::new(&device, 0x3000, "hls0");
        ap.set_auto_restart(true).unwrap();
        let v = ap.ctrl.read_register_raw(AP_CTRL, 4).unwrap() as u32;
        assert_eq!(v & AUTO_RESTART, AUTO_RESTART);
        ap.set_auto_restart(false).unwrap();
        let v = ap.ctrl.read_register_raw(AP_CTRL, 4).unwrap() as u32;
        assert_eq!(v & AUTO_RESTART, 0);
    }
}
