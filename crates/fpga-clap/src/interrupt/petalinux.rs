use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use super::{FinishCallback, InterruptCallback, InterruptState, UserInterrupt};
use crate::error::{ClapError, Result};
use crate::register::HasInterrupt;

/// Waits on `/dev/uio<K>`: writes `1u32` to unmask, then blocks on
/// `read()` for a 4-byte event count; each wait re-arms the interrupt.
pub struct PetaLinuxUserInterrupt {
    state: InterruptState,
    file: Option<File>,
}

impl Default for PetaLinuxUserInterrupt {
    fn default() -> Self {
        Self { state: InterruptState::default(), file: None }
    }
}

impl PetaLinuxUserInterrupt {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserInterrupt for PetaLinuxUserInterrupt {
    fn init(&mut self, _dev_num: u32, interrupt_num: u32, status: Option<Arc<Mutex<dyn HasInterrupt + Send>>>) -> Result<()> {
        let path = format!("/dev/uio{interrupt_num}");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| ClapError::UserInterrupt(format!("failed to open {path}: {e}")))?;
        self.file = Some(file);
        self.state.status = status;
        self.state.is_set = true;
        Ok(())
    }

    fn unset(&mut self) {
        self.file = None;
        self.state.status = None;
        self.state.is_set = false;
    }

    fn is_set(&self) -> bool {
        self.state.is_set
    }

    fn wait_for_interrupt(&mut self, _timeout_ms: i32, run_callbacks: bool) -> Result<bool> {
        self.state.require_set()?;
        let file = self.file.as_mut().expect("is_set implies file is Some");

        let unmask = 1u32.to_ne_bytes();
        file.write_all(&unmask)
            .map_err(|e| ClapError::UserInterrupt(format!("failed to unmask UIO interrupt: {e}")))?;

        let mut buf = [0u8; 4];
        file.read_exact(&mut buf)
            .map_err(|e| ClapError::UserInterrupt(format!("failed to read UIO event count: {e}")))?;
        let events = u32::from_ne_bytes(buf);

        self.state.run_callbacks(events, run_callbacks);
        Ok(true)
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
