//! Associates an IP-core instance with `(Device, ctrl_base_offset, name)`
//! and drives I/O for its [`crate::register::Register`]s.

use std::sync::{Arc, Weak};

use crate::backend::BackendOps;
use crate::device::Device;
use crate::error::{ClapError, Result};
use crate::register::{Register, RegWord};
use crate::uio;

/// What to do right after wiring a register to the control-register
/// file: nothing, or issue an immediate read so local fields reflect
/// hardware's reset state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    DoNothing,
    PostReadFromHardware,
}

/// Base for IP-core drivers: owns the `(device, ctrl_base_offset, name)`
/// triple and the raw read/write primitives that fan out to
/// `Backend::{read,write}` at widths 1/2/4/8 bytes.
pub struct RegisterControlBase {
    device: Weak<Device>,
    ctrl_base_offset: u64,
    name: String,
    interrupt_id: Option<u32>,
}

impl RegisterControlBase {
    pub fn new(device: &Arc<Device>, ctrl_base_offset: u64, name: impl Into<String>) -> Self {
        device.add_poll_addr(ctrl_base_offset);
        Self { device: Arc::downgrade(device), ctrl_base_offset, name: name.into(), interrupt_id: None }
    }

    pub fn name_tag(&self) -> &str {
        &self.name
    }

    pub fn ctrl_base_offset(&self) -> u64 {
        self.ctrl_base_offset
    }

    fn device(&self) -> Result<Arc<Device>> {
        Device::upgrade(&self.device)
    }

    /// Upgrades the back-reference for IP-core drivers that need direct
    /// backend access beyond the register read/write primitives below
    /// (e.g. to open a `UserInterrupt` or a memory manager).
    pub(crate) fn device_handle(&self) -> Result<Arc<Device>> {
        self.device()
    }

    pub fn get_dev_num(&self) -> Result<u32> {
        Ok(self.device()?.backend().dev_num())
    }

    /// Wires `reg` to the control-register file at `offset`: marks
    /// `ctrl_base + offset` as a polling address and, if requested,
    /// performs one read so `reg`'s fields reflect the hardware's reset
    /// state.
    pub fn register_reg<BT: RegWord>(&self, reg: &mut Register<BT>, offset: u64, post_action: PostAction) -> Result<()> {
        if BT::BYTES > 8 {
            return Err(ClapError::RegisterWidth { width: BT::BYTES });
        }
        let device = self.device()?;
        device.add_poll_addr(self.ctrl_base_offset + offset);

        if post_action == PostAction::PostReadFromHardware {
            self.update_register(reg, offset, crate::register::Direction::Read)?;
        }
        Ok(())
    }

    pub fn register_poll_offset(&self, offset: u64) -> Result<()> {
        self.device()?.add_poll_addr(self.ctrl_base_offset + offset);
        Ok(())
    }

    /// Performs the I/O for `Update(dir)`: on `Read`, reads one word from
    /// the backend and distributes it into `reg`'s fields; on `Write`,
    /// composes `reg`'s fields into one word and writes it.
    pub fn update_register<BT: RegWord>(&self, reg: &mut Register<BT>, offset: u64, dir: crate::register::Direction) -> Result<()> {
        match dir {
            crate::register::Direction::Read => {
                let word = self.read_register_raw(offset, BT::BYTES)?;
                reg.distribute(word);
            }
            crate::register::Direction::Write => {
                let word = reg.compose();
                self.write_register_raw(offset, word, BT::BYTES, false)?;
            }
        }
        Ok(())
    }

    pub fn read_register<BT: RegWord>(&self, offset: u64) -> Result<u64> {
        self.read_register_raw(offset, BT::BYTES)
    }

    pub fn write_register<BT: RegWord>(&self, offset: u64, value: u64, validate: bool) -> Result<()> {
        self.write_register_raw(offset, value, BT::BYTES, validate)
    }

    pub fn read_register_raw(&self, offset: u64, width: usize) -> Result<u64> {
        if width > 8 {
            return Err(ClapError::RegisterWidth { width });
        }
        let addr = self.ctrl_base_offset + offset;
        let bytes = self.device()?.read_bytes(addr, width as u64)?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(&bytes);
        Ok(u64::from_ne_bytes(buf))
    }

    pub fn write_register_raw(&self, offset: u64, value: u64, width: usize, validate: bool) -> Result<()> {
        if width > 8 {
            return Err(ClapError::RegisterWidth { width });
        }
        let addr = self.ctrl_base_offset + offset;
        let bytes = value.to_ne_bytes();
        self.device()?.write_bytes(addr, &bytes[..width])?;

        if validate {
            let read_back = self.read_register_raw(offset, width)?;
            if read_back != value {
                return Err(ClapError::IpCore {
                    core: "RegisterControlBase",
                    detail: format!(
                        "write-validate mismatch at 0x{addr:x}: wrote 0x{value:x}, read back 0x{read_back:x}"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Best-effort UIO-based interrupt-id detection: tries `interrupts`
    /// (vector) first, falling back to `interrupt-names` discrimination.
    /// Returns `None` rather than erroring if the backend has no UIO
    /// support or the properties are absent — auto-detection always
    /// degrades to a caller-provided id.
    pub fn detect_interrupt_id(&self) -> Option<u32> {
        if let Some(id) = self.interrupt_id {
            return Some(id);
        }
        let device = self.device().ok()?;
        let backend = device.backend();

        if let Ok(id) = backend.get_uio_id(self.ctrl_base_offset) {
            return Some(id as u32);
        }

        if let Ok(values) = backend.read_uio_property_vec(self.ctrl_base_offset, "interrupts") {
            return values.first().map(|v| *v as u32);
        }

        None
    }

    pub fn set_interrupt_id(&mut self, id: u32) {
        self.interrupt_id = Some(id);
    }

    pub fn interrupt_id(&self) -> Option<u32> {
        self.interrupt_id
    }

    /// Builds `/dma-channel@<hex ctrl+offset>/<property>` for per-channel
    /// devicetree lookups (used by AXI DMA's width/DRE auto-detection).
    pub fn dma_channel_property(&self, channel_offset: u64, property: &str) -> String {
        uio::build_dma_channel_property(self.ctrl_base_offset + channel_offset, property)
    }
}
