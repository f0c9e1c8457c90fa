//! Backend abstraction: the read/write/control paths to the device.

mod baremetal;
mod dummy;
mod petalinux;
mod pcie;

pub use baremetal::BareMetalBackend;
pub use dummy::DummyBackend;
pub use petalinux::PetaLinuxBackend;
pub use pcie::PcieBackend;

use crate::config::BackendConfig;
use crate::constants::RW_MAX_SIZE;
use crate::error::{ClapError, UioError};
use crate::error::Result;
use crate::interrupt::UserInterrupt;

/// Capability set implemented by every backend variant.
///
/// `read_bytes`/`write_bytes` are unbounded in length but internally
/// chunked to the host kernel's single-syscall cap ([`RW_MAX_SIZE`]).
/// `read_ctrl`/UIO lookups are optional: the default implementations
/// report "not implemented"/"unsupported", matching backends (e.g.
/// PetaLinux's `ReadCtrl`, PCIe's UIO lookups) that genuinely don't
/// support them.
pub trait BackendOps: Send + Sync {
    fn backend_name(&self) -> &str;

    fn dev_num(&self) -> u32 {
        0
    }

    /// Host-buffer alignment this backend requires (in bytes). `1` means
    /// unaligned access is fine.
    fn required_alignment(&self) -> u64 {
        1
    }

    fn read_raw(&self, addr: u64, buf: &mut [u8]) -> Result<()>;
    fn write_raw(&self, addr: u64, buf: &[u8]) -> Result<()>;

    fn read_ctrl(&self, _addr: u64, _byte_cnt: usize) -> Result<u64> {
        Err(ClapError::IpCore { core: "Backend", detail: "ReadCtrl is not implemented by this backend".into() })
    }

    fn read_uio_property(&self, _addr: u64, _name: &str) -> std::result::Result<u64, UioError> {
        Err(UioError::Unsupported)
    }

    fn read_uio_string_property(&self, _addr: u64, _name: &str) -> std::result::Result<String, UioError> {
        Err(UioError::Unsupported)
    }

    fn read_uio_property_vec(&self, _addr: u64, _name: &str) -> std::result::Result<Vec<u64>, UioError> {
        Err(UioError::Unsupported)
    }

    fn check_uio_property_exists(&self, _addr: u64, _name: &str) -> bool {
        false
    }

    fn get_uio_id(&self, _addr: u64) -> std::result::Result<i32, UioError> {
        Err(UioError::Unsupported)
    }

    fn make_user_interrupt(&self) -> Box<dyn UserInterrupt>;

    /// `read_bytes`/`write_bytes` with RW_MAX_SIZE chunking applied by
    /// the default methods below; backends normally only need to
    /// implement `read_raw`/`write_raw`.
    fn read_bytes(&self, addr: u64, len: u64) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len as usize];
        let mut done = 0u64;
        while done < len {
            let chunk = (len - done).min(RW_MAX_SIZE);
            self.read_raw(addr + done, &mut out[done as usize..(done + chunk) as usize])?;
            done += chunk;
        }
        Ok(out)
    }

    fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()> {
        let len = data.len() as u64;
        let mut done = 0u64;
        while done < len {
            let chunk = (len - done).min(RW_MAX_SIZE);
            self.write_raw(addr + done, &data[done as usize..(done + chunk) as usize])?;
            done += chunk;
        }
        Ok(())
    }
}

/// Enum dispatch over the concrete backend variants. Rust enums make the
/// original's one-time virtual dispatch unnecessary: matching is
/// resolved statically at each call site.
pub enum Backend {
    Pcie(PcieBackend),
    PetaLinux(PetaLinuxBackend),
    BareMetal(BareMetalBackend),
    Dummy(DummyBackend),
}

macro_rules! dispatch {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        match $self {
            Backend::Pcie(b) => b.$method($($arg),*),
            Backend::PetaLinux(b) => b.$method($($arg),*),
            Backend::BareMetal(b) => b.$method($($arg),*),
            Backend::Dummy(b) => b.$method($($arg),*),
        }
    };
}

impl Backend {
    pub fn pcie(config: BackendConfig) -> Result<Self> {
        Ok(Backend::Pcie(PcieBackend::new(config)?))
    }

    pub fn petalinux(base_addr: u64, config: BackendConfig) -> Result<Self> {
        Ok(Backend::PetaLinux(PetaLinuxBackend::new(base_addr, config)?))
    }

    pub fn bare_metal(base_addr: u64) -> Self {
        Backend::BareMetal(BareMetalBackend::new(base_addr))
    }

    pub fn dummy() -> Self {
        Backend::Dummy(DummyBackend::from_env())
    }
}

impl BackendOps for Backend {
    fn backend_name(&self) -> &str {
        dispatch!(self, backend_name())
    }

    fn dev_num(&self) -> u32 {
        dispatch!(self, dev_num())
    }

    fn required_alignment(&self) -> u64 {
        dispatch!(self, required_alignment())
    }

    fn read_raw(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        dispatch!(self, read_raw(addr, buf))
    }

    fn write_raw(&self, addr: u64, buf: &[u8]) -> Result<()> {
        dispatch!(self, write_raw(addr, buf))
    }

    fn read_ctrl(&self, addr: u64, byte_cnt: usize) -> Result<u64> {
        dispatch!(self, read_ctrl(addr, byte_cnt))
    }

    fn read_uio_property(&self, addr: u64, name: &str) -> std::result::Result<u64, UioError> {
        dispatch!(self, read_uio_property(addr, name))
    }

    fn read_uio_string_property(&self, addr: u64, name: &str) -> std::result::Result<String, UioError> {
        dispatch!(self, read_uio_string_property(addr, name))
    }

    fn read_uio_property_vec(&self, addr: u64, name: &str) -> std::result::Result<Vec<u64>, UioError> {
        dispatch!(self, read_uio_property_vec(addr, name))
    }

    fn check_uio_property_exists(&self, addr: u64, name: &str) -> bool {
        dispatch!(self, check_uio_property_exists(addr, name))
    }

    fn get_uio_id(&self, addr: u64) -> std::result::Result<i32, UioError> {
        dispatch!(self, get_uio_id(addr))
    }

    fn make_user_interrupt(&self) -> Box<dyn UserInterrupt> {
        dispatch!(self, make_user_interrupt())
    }
}
