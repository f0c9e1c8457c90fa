use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;

use super::BackendOps;
use crate::config::BackendConfig;
use crate::constants::{XDMA_CTRL_BASE, XDMA_CTRL_SIZE};
use crate::error::{ClapError, Result};
use crate::interrupt::{PcieUserInterrupt, UserInterrupt};

/// Opens `/dev/xdma<N>_h2c_<K>` (write), `/dev/xdma<N>_c2h_<K>` (read) and
/// `/dev/xdma<N>_control` (short control reads) for one channel pair.
pub struct PcieBackend {
    h2c: File,
    c2h: File,
    control: File,
    dev_num: u32,
    channel_num: u32,
    name: String,
}

impl PcieBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let dev_num = config.device_num;
        let channel_num = config.channel_num;

        let h2c_path = format!("/dev/xdma{dev_num}_h2c_{channel_num}");
        let c2h_path = format!("/dev/xdma{dev_num}_c2h_{channel_num}");
        let ctrl_path = format!("/dev/xdma{dev_num}_control");

        let h2c = OpenOptions::new()
            .write(true)
            .open(&h2c_path)
            .map_err(|e| io_err("open", &h2c_path, e))?;
        let c2h = OpenOptions::new()
            .read(true)
            .open(&c2h_path)
            .map_err(|e| io_err("open", &c2h_path, e))?;
        let control = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&ctrl_path)
            .map_err(|e| io_err("open", &ctrl_path, e))?;

        Ok(Self { h2c, c2h, control, dev_num, channel_num, name: "PCIe".into() })
    }
}

fn io_err(method: &'static str, path: &str, source: std::io::Error) -> ClapError {
    ClapError::BackendIo { method, addr: 0, size: path.len() as u64, source }
}

impl BackendOps for PcieBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn dev_num(&self) -> u32 {
        self.dev_num
    }

    fn required_alignment(&self) -> u64 {
        crate::constants::XDMA_ALIGNMENT
    }

    fn read_raw(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let n = self
            .c2h
            .read_at(buf, addr)
            .map_err(|e| ClapError::BackendIo { method: "read", addr, size: buf.len() as u64, source: e })?;
        if n != buf.len() {
            return Err(ClapError::ShortTransfer { method: "read", addr, size: buf.len() as u64, actual: n as u64 });
        }
        Ok(())
    }

    fn write_raw(&self, addr: u64, buf: &[u8]) -> Result<()> {
        let n = self
            .h2c
            .write_at(buf, addr)
            .map_err(|e| ClapError::BackendIo { method: "write", addr, size: buf.len() as u64, source: e })?;
        if n != buf.len() {
            return Err(ClapError::ShortTransfer { method: "write", addr, size: buf.len() as u64, actual: n as u64 });
        }
        Ok(())
    }

    fn read_ctrl(&self, addr: u64, byte_cnt: usize) -> Result<u64> {
        if byte_cnt > 8 {
            return Err(ClapError::IpCore {
                core: "PcieBackend",
                detail: format!("control read size ({byte_cnt} byte) exceeds maximal allowed size (8 byte)"),
            });
        }
        if addr < XDMA_CTRL_BASE || addr + byte_cnt as u64 > XDMA_CTRL_BASE + XDMA_CTRL_SIZE {
            return Err(ClapError::OutOfRange { addr, len: byte_cnt as u64 });
        }
        let mut buf = [0u8; 8];
        let n = self
            .control
            .read_at(&mut buf[..byte_cnt], addr)
            .map_err(|e| ClapError::BackendIo { method: "read_ctrl", addr, size: byte_cnt as u64, source: e })?;
        if n != byte_cnt {
            return Err(ClapError::ShortTransfer { method: "read_ctrl", addr, size: byte_cnt as u64, actual: n as u64 });
        }
        Ok(u64::from_ne_bytes(buf))
    }

    fn make_user_interrupt(&self) -> Box<dyn UserInterrupt> {
        Box::new(PcieUserInterrupt::new())
    }
}
