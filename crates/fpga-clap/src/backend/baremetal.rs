use std::ptr;

use super::BackendOps;
use crate::interrupt::{DummyUserInterrupt, UserInterrupt};

/// Direct pointer dereference over a statically mapped address range, for
/// builds running with no OS (no char devices, no mmap).
pub struct BareMetalBackend {
    base_addr: u64,
    name: String,
}

impl BareMetalBackend {
    pub fn new(base_addr: u64) -> Self {
        Self { base_addr, name: "BareMetal".into() }
    }
}

impl BackendOps for BareMetalBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn required_alignment(&self) -> u64 {
        1
    }

    fn read_raw(&self, addr: u64, buf: &mut [u8]) -> crate::error::Result<()> {
        let ptr = (self.base_addr + addr) as *const u8;
        unsafe {
            ptr::copy_nonoverlapping(ptr, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    fn write_raw(&self, addr: u64, buf: &[u8]) -> crate::error::Result<()> {
        let ptr = (self.base_addr + addr) as *mut u8;
        unsafe {
            ptr::copy_nonoverlapping(buf.as_ptr(), ptr, buf.len());
        }
        Ok(())
    }

    fn make_user_interrupt(&self) -> Box<dyn UserInterrupt> {
        // No kernel event file exists in a bare-metal build; callers must
        // drive completion purely by status-register polling.
        Box::new(DummyUserInterrupt::new())
    }
}
