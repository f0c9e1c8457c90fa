use std::os::fd::{AsRawFd, RawFd};
use std::ptr;
use std::sync::Mutex;

use super::BackendOps;
use crate::config::BackendConfig;
use crate::constants::RW_MAX_SIZE;
use crate::error::{ClapError, Result, UioError};
use crate::interrupt::{PetaLinuxUserInterrupt, UserInterrupt};
use crate::uio;

const MAP_WINDOW: u64 = 0x1_0000;
const MAP_MASK: u64 = !0xFFFFu64;

/// Maps `/dev/mem` on demand: each transfer `mmap`s a `64 KiB +
/// sizeInByte` window around the target address and tears it down
/// afterwards, rather than keeping a long-lived mapping across unrelated
/// addresses.
pub struct PetaLinuxBackend {
    fd: std::fs::File,
    base_addr: u64,
    dev_num: u32,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
    name: String,
}

impl PetaLinuxBackend {
    pub fn new(base_addr: u64, config: BackendConfig) -> Result<Self> {
        let fd = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/mem")
            .map_err(|e| ClapError::BackendIo { method: "open", addr: 0, size: 0, source: e })?;

        Ok(Self {
            fd,
            base_addr,
            dev_num: config.device_num,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            name: "PetaLinux".into(),
        })
    }

    fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn with_mapping<F: FnOnce(*mut u8) -> Result<()>>(&self, addr: u64, size_in_byte: u64, f: F) -> Result<()> {
        let addr_base = addr & MAP_MASK;
        let map_len = MAP_WINDOW + size_in_byte;

        let map_ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.raw_fd(),
                addr_base as libc::off_t,
            )
        };
        if map_ptr == libc::MAP_FAILED {
            return Err(ClapError::BackendIo {
                method: "mmap",
                addr,
                size: size_in_byte,
                source: std::io::Error::last_os_error(),
            });
        }

        let result = f(map_ptr as *mut u8);

        unsafe {
            libc::munmap(map_ptr, map_len as usize);
        }

        result
    }
}

impl BackendOps for PetaLinuxBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn dev_num(&self) -> u32 {
        self.dev_num
    }

    fn required_alignment(&self) -> u64 {
        1
    }

    fn read_raw(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let _guard = self.read_lock.lock().unwrap();
        let addr_offset = addr & 0xFFFF;
        let size = buf.len() as u64;

        self.with_mapping(addr, size, |map_base| {
            let mut count = 0u64;
            while count < size {
                let bytes = (size - count).min(RW_MAX_SIZE);
                unsafe {
                    let src = map_base.add((addr_offset + count) as usize);
                    ptr::copy_nonoverlapping(src, buf[count as usize..].as_mut_ptr(), bytes as usize);
                }
                count += bytes;
            }
            Ok(())
        })
    }

    fn write_raw(&self, addr: u64, buf: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let addr_offset = addr & 0xFFFF;
        let size = buf.len() as u64;

        self.with_mapping(addr, size, |map_base| {
            let mut count = 0u64;
            while count < size {
                let bytes = (size - count).min(RW_MAX_SIZE);
                unsafe {
                    let dst = map_base.add((addr_offset + count) as usize);
                    ptr::copy_nonoverlapping(buf[count as usize..].as_ptr(), dst, bytes as usize);
                }
                count += bytes;
            }
            Ok(())
        })
    }

    fn read_ctrl(&self, _addr: u64, _byte_cnt: usize) -> Result<u64> {
        tracing::debug!(target: "fpga_clap::backend::petalinux", "ReadCtrl is not implemented by the PetaLinux backend");
        Err(ClapError::IpCore { core: "PetaLinuxBackend", detail: "ReadCtrl is not implemented by this backend".into() })
    }

    fn get_uio_id(&self, addr: u64) -> std::result::Result<i32, UioError> {
        uio::find_uio_id_for_addr(self.base_addr + addr).map(|id| id as i32)
    }

    fn read_uio_property(&self, addr: u64, name: &str) -> std::result::Result<u64, UioError> {
        let id = self.get_uio_id(addr)?;
        uio::read_scalar_property(id as u32, name)
    }

    fn read_uio_string_property(&self, addr: u64, name: &str) -> std::result::Result<String, UioError> {
        let id = self.get_uio_id(addr)?;
        uio::read_string_property(id as u32, name)
    }

    fn read_uio_property_vec(&self, addr: u64, name: &str) -> std::result::Result<Vec<u64>, UioError> {
        let id = self.get_uio_id(addr)?;
        uio::read_vec_property(id as u32, name)
    }

    fn check_uio_property_exists(&self, addr: u64, name: &str) -> bool {
        match self.get_uio_id(addr) {
            Ok(id) => uio::property_exists(id as u32, name),
            Err(_) => false,
        }
    }

    fn make_user_interrupt(&self) -> Box<dyn UserInterrupt> {
        Box::new(PetaLinuxUserInterrupt::new())
    }
}
