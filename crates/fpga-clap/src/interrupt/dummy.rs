use std::sync::{Arc, Mutex};

use super::{FinishCallback, InterruptCallback, InterruptState, UserInterrupt};
use crate::error::Result;
use crate::register::HasInterrupt;

/// Test double: `Init` marks the handle usable but `WaitForInterrupt`
/// never blocks and always reports a timeout, matching
/// `DummyUserInterrupt` in the reference test support code.
#[derive(Default)]
pub struct DummyUserInterrupt {
    state: InterruptState,
}

impl DummyUserInterrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: simulate an interrupt firing with the given mask.
    pub fn trigger(&mut self, mask: u32) {
        self.state.run_callbacks(mask, true);
    }
}

impl UserInterrupt for DummyUserInterrupt {
    fn init(&mut self, _dev_num: u32, _interrupt_num: u32, status: Option<Arc<Mutex<dyn HasInterrupt + Send>>>) -> Result<()> {
        self.state.status = status;
        self.state.is_set = true;
        Ok(())
    }

    fn unset(&mut self) {
        self.state.is_set = false;
        self.state.status = None;
    }

    fn is_set(&self) -> bool {
        self.state.is_set
    }

    fn wait_for_interrupt(&mut self, _timeout_ms: i32, _run_callbacks: bool) -> Result<bool> {
        self.state.require_set()?;
        Ok(false)
    }

    fn register_callback(&mut self, callback: InterruptCallback) {
        self.state.callbacks.push(callback);
    }

    fn set_finish_callback(&mut self, callback: FinishCallback) {
        self.state.finish_callback = Some(callback);
    }

    fn ip_core_finished(&self) -> bool {
        self.state.ip_core_finished
    }

    fn last_interrupt(&self) -> u32 {
        self.state.last_interrupt
    }
}
