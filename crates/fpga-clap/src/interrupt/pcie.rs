use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;
use std::sync::{Arc, Mutex};

use super::{FinishCallback, InterruptCallback, InterruptState, UserInterrupt};
use crate::constants::WAIT_INFINITE;
use crate::error::{ClapError, Result};
use crate::register::HasInterrupt;

/// Waits on `/dev/xdma<N>_events_<K>`: `poll(POLLIN)` then `pread` of a
/// 4-byte event count, which the kernel treats as the acknowledgement.
pub struct PcieUserInterrupt {
    state: InterruptState,
    file: Option<File>,
}

impl Default for PcieUserInterrupt {
    fn default() -> Self {
        Self { state: InterruptState::default(), file: None }
    }
}

impl PcieUserInterrupt {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserInterrupt for PcieUserInterrupt {
    fn init(&mut self, dev_num: u32, interrupt_num: u32, status: Option<Arc<Mutex<dyn HasInterrupt + Send>>>) -> Result<()> {
        let path = format!("/dev/xdma{dev_num}_events_{interrupt_num}");
        let file = OpenOptions::new()
            .read(true)
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

    fn wait_for_interrupt(&mut self, timeout_ms: i32, run_callbacks: bool) -> Result<bool> {
        self.state.require_set()?;
        let file = self.file.as_ref().expect("is_set implies file is Some");

        let mut pfd = libc::pollfd { fd: file.as_raw_fd(), events: libc::POLLIN, revents: 0 };
        let timeout = if timeout_ms == WAIT_INFINITE { -1 } else { timeout_ms };
        let n = unsafe { libc::poll(&mut pfd, 1, timeout) };
        if n < 0 {
            return Err(ClapError::UserInterrupt(format!(
                "poll failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        if n == 0 {
            return Ok(false);
        }

        let mut buf = [0u8; 4];
        file.read_at(&mut buf, 0)
            .map_err(|e| ClapError::UserInterrupt(format!("pread of event count failed: {e}")))?;
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
