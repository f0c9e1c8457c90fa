//! Process-wide facade over one [`Backend`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::instrument;

use crate::backend::{Backend, BackendOps};
use crate::error::{ClapError, Result};
use crate::memory::MemoryManager;
use crate::solo_run::SoloRunLock;

/// Which device-memory region an allocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Ddr,
    Bram,
}

/// Owns a backend instance, a keyed collection of [`MemoryManager`]s, the
/// set of polling addresses excluded from per-transfer logging, and the
/// solo-run lock.
///
/// Every IP-core object holds a non-owning [`Weak<Device>`] back-reference
/// rather than the original's raw parent pointer plus manual
/// invalidation registry; dereferencing after the `Device` is dropped
/// fails with [`ClapError::DeviceGone`] instead of dangling.
pub struct Device {
    backend: Backend,
    memory_managers: Mutex<HashMap<MemoryKind, Arc<MemoryManager>>>,
    poll_addrs: Mutex<HashSet<u64>>,
    log_byte_threshold: AtomicU64,
    _solo_run: Option<SoloRunLock>,
}

impl Device {
    /// Creates a Device and acquires the process-wide solo-run lock.
    pub fn new(backend: Backend) -> Result<Arc<Self>> {
        let lock = SoloRunLock::acquire()?;
        Ok(Self::new_inner(backend, Some(lock)))
    }

    /// Creates a Device without taking the solo-run lock — for tests that
    /// run many Devices concurrently in one process.
    pub fn new_unlocked(backend: Backend) -> Arc<Self> {
        Self::new_inner(backend, None)
    }

    fn new_inner(backend: Backend, lock: Option<SoloRunLock>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            memory_managers: Mutex::new(HashMap::new()),
            poll_addrs: Mutex::new(HashSet::new()),
            log_byte_threshold: AtomicU64::new(8),
            _solo_run: lock,
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Upgrades a weak back-reference or reports the device is gone.
    pub fn upgrade(weak: &Weak<Device>) -> Result<Arc<Device>> {
        weak.upgrade().ok_or(ClapError::DeviceGone)
    }

    /// Declares a new memory-manager region of `size` bytes starting at
    /// `base`, keyed by `kind`. Replaces any prior region of the same
    /// kind.
    pub fn add_memory_region(&self, kind: MemoryKind, base: u64, size: u64) -> Arc<MemoryManager> {
        let manager = Arc::new(MemoryManager::new(base, size));
        self.memory_managers.lock().unwrap().insert(kind, manager.clone());
        manager
    }

    pub fn memory_manager(&self, kind: MemoryKind) -> Option<Arc<MemoryManager>> {
        self.memory_managers.lock().unwrap().get(&kind).cloned()
    }

    pub fn add_poll_addr(&self, addr: u64) {
        self.poll_addrs.lock().unwrap().insert(addr);
    }

    pub fn remove_poll_addr(&self, addr: u64) {
        self.poll_addrs.lock().unwrap().remove(&addr);
    }

    pub fn is_poll_addr(&self, addr: u64) -> bool {
        self.poll_addrs.lock().unwrap().contains(&addr)
    }

    pub fn set_log_byte_threshold(&self, threshold: u64) {
        self.log_byte_threshold.store(threshold, Ordering::Relaxed);
    }

    pub fn log_byte_threshold(&self) -> u64 {
        self.log_byte_threshold.load(Ordering::Relaxed)
    }

    fn check_alignment(&self, addr: u64) -> Result<()> {
        let required = self.backend.required_alignment();
        if required > 1 && addr % required != 0 {
            return Err(ClapError::Alignment { addr, required });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(addr = %format!("0x{addr:x}"), len))]
    pub fn read_bytes(&self, addr: u64, len: u64) -> Result<Vec<u8>> {
        self.check_alignment(addr)?;
        let mut timer = crate::timer::Timer::new();
        timer.start();
        let data = self.backend.read_bytes(addr, len)?;
        timer.stop();
        self.log_transfer(addr, len, &timer, true);
        Ok(data)
    }

    #[instrument(skip(self, data), fields(addr = %format!("0x{addr:x}"), len = data.len()))]
    pub fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()> {
        self.check_alignment(addr)?;
        let mut timer = crate::timer::Timer::new();
        timer.start();
        self.backend.write_bytes(addr, data)?;
        timer.stop();
        self.log_transfer(addr, data.len() as u64, &timer, false);
        Ok(())
    }

    fn log_transfer(&self, addr: u64, size: u64, timer: &crate::timer::Timer, reading: bool) {
        if size <= self.log_byte_threshold() {
            return;
        }
        if self.is_poll_addr(addr) {
            return;
        }
        let secs = if timer.elapsed_secs() == 0.0 { 1.0e-9 } else { timer.elapsed_secs() };
        let speed = size as f64 / secs;
        if reading {
            tracing::trace!(target: "fpga_clap::device", addr, size, ms = timer.elapsed_ms(), speed, "read");
        } else {
            tracing::trace!(target: "fpga_clap::device", addr, size, ms = timer.elapsed_ms(), speed, "write");
        }
    }

    pub fn read32(&self, addr: u64) -> Result<u32> {
        let bytes = self.read_bytes(addr, 4)?;
        Ok(u32::from_ne_bytes(bytes.try_into().unwrap()))
    }

    pub fn write32(&self, addr: u64, value: u32) -> Result<()> {
        self.write_bytes(addr, &value.to_ne_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn round_trip_word_and_bytes() {
        let device = Device::new_unlocked(Backend::Dummy(DummyBackend::new_pcie()));
        device.write32(0x100, 0xA5A5_A5A5).unwrap();
        assert_eq!(device.read32(0x100).unwrap(), 0xA5A5_A5A5);

        device.write_bytes(0x200, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(device.read_bytes(0x200, 5).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn memory_region_scenario() {
        let device = Device::new_unlocked(Backend::Dummy(DummyBackend::new_pcie()));
        let mgr = device.add_memory_region(MemoryKind::Ddr, 0x1000, 0x200);
        let mut a = mgr.alloc(0x20).unwrap();
        assert_eq!(a.base_addr().unwrap(), 0x1000);
        let mut b = mgr.alloc(0x10).unwrap();
        assert_eq!(b.base_addr().unwrap(), 0x1040);
        mgr.free(&mut a);
        mgr.free(&mut b);
        assert_eq!(mgr.available_space(), 0x200);
    }
}
