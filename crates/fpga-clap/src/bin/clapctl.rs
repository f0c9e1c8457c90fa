//! Example device bring-up CLI, analogous to the original project's
//! `main.cpp` samples (`DDRAccess`, `AxiGPIODemo`): register a Device,
//! read/write a scratch register, then exercise a simple-mode DMA
//! transfer. Falls back to the Dummy backend whenever no real device
//! node is present, so this runs anywhere.
//!
//! Usage: `clapctl [--backend dummy|pcie|petalinux] [--dev N]`

use std::sync::Arc;

use fpga_clap::backend::Backend;
use fpga_clap::config::BackendConfig;
use fpga_clap::device::MemoryKind;
use fpga_clap::ip_cores::{DmaChannel, GpioChannel};
use fpga_clap::Device;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let backend_name = flag_value(&args, "--backend").unwrap_or_else(|| "dummy".to_string());
    let dev_num: u32 = flag_value(&args, "--dev").and_then(|v| v.parse().ok()).unwrap_or(0);

    tracing::info!(backend = %backend_name, dev_num, "clapctl starting up");

    let backend = match backend_name.as_str() {
        "pcie" => Backend::pcie(BackendConfig { device_num: dev_num, channel_num: 0, ..Default::default() })?,
        "petalinux" => Backend::petalinux(0x4000_0000, BackendConfig { device_num: dev_num, ..Default::default() })?,
        _ => Backend::dummy(),
    };

    let device = Device::new(backend)?;
    ddr_access_demo(&device)?;
    gpio_demo(&device)?;
    dma_demo(&device)?;

    tracing::info!("clapctl finished");
    Ok(())
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

/// Writes a scratch word to a DDR-backed memory region and reads it back.
fn ddr_access_demo(device: &Arc<Device>) -> anyhow::Result<()> {
    let mgr = device.add_memory_region(MemoryKind::Ddr, 0x1000_0000, 0x1_0000);
    let mut buf = mgr.alloc(0x1000)?;
    let addr = buf.base_addr()?;

    device.write32(addr, 0xDEAD_BEEF)?;
    let value = device.read32(addr)?;
    tracing::info!(addr = %format!("0x{addr:x}"), value = %format!("0x{value:x}"), "DDR scratch round trip");

    mgr.free(&mut buf);
    Ok(())
}

/// Drives one GPIO channel's direction and data registers.
fn gpio_demo(device: &Arc<Device>) -> anyhow::Result<()> {
    let gpio = fpga_clap::ip_cores::AxiGpio::new(device, 0x4100_0000, "gpio0");
    gpio.set_direction(GpioChannel::Channel1, 0x0000)?;
    gpio.write(GpioChannel::Channel1, 0x0001)?;
    let value = gpio.read(GpioChannel::Channel1)?;
    tracing::info!(value = %format!("0x{value:x}"), "GPIO channel 1 data");
    Ok(())
}

/// Runs a small simple-mode DMA loopback against the Dummy backend's
/// in-process memory.
fn dma_demo(device: &Arc<Device>) -> anyhow::Result<()> {
    let dma = fpga_clap::ip_cores::AxiDma::new(device, 0x4200_0000, "dma0")?;
    if dma.has_sg() {
        tracing::info!("DMA engine reports Scatter/Gather support; this demo only exercises simple mode");
    }

    let mgr = device.add_memory_region(MemoryKind::Bram, 0x2000_0000, 0x1_0000);
    let mut src = mgr.alloc(0x100)?;
    let mut dst = mgr.alloc(0x100)?;
    let src_addr = src.base_addr()?;
    let dst_addr = dst.base_addr()?;

    device.write_bytes(src_addr, &[0xAB; 0x40])?;
    dma.start(src_addr, 0x40, dst_addr, 0x40)?;
    dma.wait_for_finish(DmaChannel::Mm2s, -1)?;
    dma.wait_for_finish(DmaChannel::S2mm, -1)?;

    let results = dma.chunk_results(DmaChannel::S2mm);
    tracing::info!(bytes = results.total_transferred_bytes(), "DMA transfer complete");

    mgr.free(&mut src);
    mgr.free(&mut dst);
    Ok(())
}
