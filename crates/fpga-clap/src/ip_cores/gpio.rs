//! AXI GPIO: up to two independent channels of discrete I/O, each with
//! a data register, a tristate (direction) register, and a shared
//! global-interrupt-enable plus per-channel status/enable bits.

use std::sync::Arc;

use crate::device::Device;
use crate::error::Result;
use crate::register::HasInterrupt;
use crate::register_control::RegisterControlBase;

const GPIO_DATA: u64 = 0x00;
const GPIO_TRI: u64 = 0x04;
const GPIO2_DATA: u64 = 0x08;
const GPIO2_TRI: u64 = 0x0C;
const GIER: u64 = 0x11C;
const IP_ISR: u64 = 0x120;
const IP_IER: u64 = 0x128;

const GIER_GIE: u32 = 1 << 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioChannel {
    Channel1,
    Channel2,
}

fn offsets(channel: GpioChannel) -> (u64, u64, u32) {
    match channel {
        GpioChannel::Channel1 => (GPIO_DATA, GPIO_TRI, 1 << 0),
        GpioChannel::Channel2 => (GPIO2_DATA, GPIO2_TRI, 1 << 1),
    }
}

/// Two-channel discrete I/O core. `set_direction`'s bitmask follows the
/// hardware convention: a `1` bit marks that line as an input.
pub struct AxiGpio {
    ctrl: RegisterControlBase,
}

impl AxiGpio {
    pub fn new(device: &Arc<Device>, ctrl_base_offset: u64, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { ctrl: RegisterControlBase::new(device, ctrl_base_offset, name) })
    }

    pub fn set_direction(&self, channel: GpioChannel, input_mask: u32) -> Result<()> {
        let (_, tri, _) = offsets(channel);
        self.ctrl.write_register_raw(tri, input_mask as u64, 4, false)
    }

    pub fn direction(&self, channel: GpioChannel) -> Result<u32> {
        let (_, tri, _) = offsets(channel);
        Ok(self.ctrl.read_register_raw(tri, 4)? as u32)
    }

    pub fn write(&self, channel: GpioChannel, value: u32) -> Result<()> {
        let (data, _, _) = offsets(channel);
        self.ctrl.write_register_raw(data, value as u64, 4, false)
    }

    pub fn read(&self, channel: GpioChannel) -> Result<u32> {
        let (data, _, _) = offsets(channel);
        Ok(self.ctrl.read_register_raw(data, 4)? as u32)
    }

    pub fn set_bits(&self, channel: GpioChannel, mask: u32) -> Result<()> {
        let current = self.read(channel)?;
        self.write(channel, current | mask)
    }

    pub fn clear_bits(&self, channel: GpioChannel, mask: u32) -> Result<()> {
        let current = self.read(channel)?;
        self.write(channel, current & !mask)
    }

    /// Sets the channel's bit in `IP_IER` and, if this is the first
    /// channel enabled, also sets `GIER.GIE` (the global gate every
    /// channel interrupt passes through).
    pub fn enable_interrupts(&self, channel: GpioChannel) -> Result<()> {
        let (_, _, bit) = offsets(channel);
        let ier = self.ctrl.read_register_raw(IP_IER, 4)? as u32;
        self.ctrl.write_register_raw(IP_IER, (ier | bit) as u64, 4, false)?;

        let gier = self.ctrl.read_register_raw(GIER, 4)? as u32;
        self.ctrl.write_register_raw(GIER, (gier | GIER_GIE) as u64, 4, false)
    }

    pub fn disable_interrupts(&self, channel: GpioChannel) -> Result<()> {
        let (_, _, bit) = offsets(channel);
        let ier = self.ctrl.read_register_raw(IP_IER, 4)? as u32;
        let ier = ier & !bit;
        self.ctrl.write_register_raw(IP_IER, ier as u64, 4, false)?;
        if ier == 0 {
            self.ctrl.write_register_raw(GIER, 0, 4, false)?;
        }
        Ok(())
    }

    pub fn interrupt_status(&self) -> Result<u32> {
        Ok(self.ctrl.read_register_raw(IP_ISR, 4)? as u32)
    }

    /// Write-1-to-clear acknowledgment for whichever channel bits are set.
    pub fn ack_interrupts(&self, mask: u32) -> Result<()> {
        self.ctrl.write_register_raw(IP_ISR, mask as u64, 4, false)
    }
}

impl HasInterrupt for AxiGpio {
    fn clear_interrupts(&mut self) {
        if let Ok(status) = self.interrupt_status() {
            let _ = self.ack_interrupts(status);
        }
    }

    fn get_last_interrupt(&self) -> u32 {
        self.interrupt_status().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, DummyBackend};

    fn device() -> Arc<Device> {
        Device::new_unlocked(Backend::Dummy(DummyBackend::new_pcie()))
    }

    #[test]
    fn direction_and_data_round_trip() {
        let gpio = AxiGpio::new(&device(), 0x2000, "gpio0");
        gpio.set_direction(GpioChannel::Channel1, 0x0F).unwrap();
        assert_eq!(gpio.direction(GpioChannel::Channel1).unwrap(), 0x0F);

        gpio.write(GpioChannel::Channel1, 0xA5).unwrap();
        assert_eq!(gpio.read(GpioChannel::Channel1).unwrap(), 0xA5);

        gpio.set_bits(GpioChannel::Channel1, 0x10).unwrap();
        assert_eq!(gpio.read(GpioChannel::Channel1).unwrap(), 0xB5);
        gpio.clear_bits(GpioChannel::Channel1, 0x05).unwrap();
        assert_eq!(gpio.read(GpioChannel::Channel1).unwrap(), 0xB0);
    }

    #[test]
    fn two_channels_are_independent() {
        let gpio = AxiGpio::new(&device(), 0x2000, "gpio0");
        gpio.write(GpioChannel::Channel1, 0x11).unwrap();
        gpio.write(GpioChannel::Channel2, 0x22).unwrap();
        assert_eq!(gpio.read(GpioChannel::Channel1).unwrap(), 0x11);
        assert_eq!(gpio.read(GpioChannel::Channel2).unwrap(), 0x22);
    }

    #[test]
    fn enabling_interrupts_sets_global_enable() {
        let gpio = AxiGpio::new(&device(), 0x2000, "gpio0");
        gpio.enable_interrupts(GpioChannel::Channel1).unwrap();
        let gier = gpio.ctrl.read_register_raw(GIER, 4).unwrap() as u32;
        assert_eq!(gier & GIER_GIE, GIER_GIE);

        gpio.disable_interrupts(GpioChannel::Channel1).unwrap();
        let gier = gpio.ctrl.read_register_raw(GIER, 4).unwrap() as u32;
        assert_eq!(gier & GIER_GIE, 0);
    }
}
