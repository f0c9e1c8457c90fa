//! Concrete end-to-end seed cases, one per ip core, exercised against
//! the Dummy backend the way `clapctl` exercises real hardware.

use std::sync::Arc;
use std::time::Duration;

use fpga_clap::backend::{Backend, DummyBackend};
use fpga_clap::config::{DummyBackendConfig, RegSection, RegValueEntry, UioScalarEntry, UioSection};
use fpga_clap::ip_cores::{ApCtrl, AxiDma, AxiInterruptController, DmaChannel};
use fpga_clap::memory::MemoryManager;
use fpga_clap::Device;

fn dummy_device(cfg: DummyBackendConfig) -> Arc<Device> {
    Device::new_unlocked(Backend::Dummy(DummyBackend::from_config(cfg, true)))
}

#[test]
fn round_trip_32_bit_word() {
    let device = dummy_device(DummyBackendConfig::empty());

    device.write32(0x100, 0xA5A5_A5A5).unwrap();
    assert_eq!(device.read32(0x100).unwrap(), 0xA5A5_A5A5);

    device.write_bytes(0x200, &[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(device.read_bytes(0x200, 5).unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn memory_manager_region_scenario() {
    let mgr = MemoryManager::new(0x1000, 0x200);

    let mut a = mgr.alloc(0x20).unwrap();
    assert_eq!(a.base_addr().unwrap(), 0x1000);

    let mut b = mgr.alloc(0x10).unwrap();
    assert_eq!(b.base_addr().unwrap(), 0x1040);

    assert!(mgr.free(&mut a));
    assert!(mgr.free(&mut b));
    assert_eq!(mgr.available_space(), 0x200);
}

#[test]
fn hls_apctrl_auto_complete_scenario() {
    const APCTRL_BASE: u64 = 0x3000;
    let cfg = DummyBackendConfig { apctrl_autocomplete: vec![APCTRL_BASE], ..DummyBackendConfig::empty() };
    let device = dummy_device(cfg);

    let apctrl = ApCtrl::new(&device, APCTRL_BASE, "hls0");
    apctrl.start().unwrap();
    assert!(apctrl.wait_for_finish(Duration::from_millis(100).as_millis() as i32).unwrap());

    let byte = device.read_bytes(APCTRL_BASE, 1).unwrap()[0];
    assert_ne!(byte & 0x02, 0);
}

#[test]
fn axi_intc_demux_scenario() {
    const INTC_BASE: u64 = 0x6000_0000;
    let cfg = DummyBackendConfig {
        reg: RegSection { values: vec![RegValueEntry { addr: INTC_BASE, value: 0x1, width: 4 }], hooks: Vec::new() },
        ..DummyBackendConfig::empty()
    };
    let device = dummy_device(cfg);
    let intc = AxiInterruptController::new(&device, INTC_BASE, "intc0");

    let fired = Arc::new(std::sync::Mutex::new(false));
    let fired_cb = fired.clone();
    intc.register_intr_callback(0, Box::new(move |_mask| *fired_cb.lock().unwrap() = true));

    intc.core_interrupt_triggered(Some(0)).unwrap();

    assert!(*fired.lock().unwrap());
    assert_eq!(device.read32(INTC_BASE + 0x0C).unwrap(), 0x1);
}

#[test]
fn axi_dma_simple_start_scenario() {
    const CTRL_BASE: u64 = 0x4200_0000;
    const MM2S_BASE: u64 = 0x00;
    const S2MM_BASE: u64 = 0x30;
    const BUFFER_ADDR: u64 = 0x18;
    const LENGTH: u64 = 0x28;

    let scalars = vec![
        UioScalarEntry { addr: CTRL_BASE, name: "xlnx,sg-length-width".into(), value: 14 },
        UioScalarEntry {
            addr: CTRL_BASE,
            name: format!("dma-channel@{:x}/xlnx,datawidth", CTRL_BASE + MM2S_BASE),
            value: 32,
        },
        UioScalarEntry {
            addr: CTRL_BASE,
            name: format!("dma-channel@{:x}/xlnx,datawidth", CTRL_BASE + S2MM_BASE),
            value: 32,
        },
    ];
    let cfg = DummyBackendConfig {
        uio: UioSection { scalars, strings: Vec::new(), vectors: Vec::new(), ids: Vec::new() },
        ..DummyBackendConfig::empty()
    };
    let device = dummy_device(cfg);
    let dma = AxiDma::new(&device, CTRL_BASE, "dma0").unwrap();

    assert_eq!(dma.max_transfer_length(DmaChannel::Mm2s), 0x1000);
    assert_eq!(dma.max_transfer_length(DmaChannel::S2mm), 0x1000);

    dma.start(0x1000, 64, 0x2000, 64).unwrap();

    let mm2s_sa = u64::from_le_bytes(device.read_bytes(CTRL_BASE + MM2S_BASE + BUFFER_ADDR, 8).unwrap().try_into().unwrap());
    let s2mm_da = u64::from_le_bytes(device.read_bytes(CTRL_BASE + S2MM_BASE + BUFFER_ADDR, 8).unwrap().try_into().unwrap());
    assert_eq!(mm2s_sa, 0x1000);
    assert_eq!(s2mm_da, 0x2000);

    assert_eq!(device.read32(CTRL_BASE + MM2S_BASE + LENGTH).unwrap(), 64);
    assert_eq!(device.read32(CTRL_BASE + S2MM_BASE + LENGTH).unwrap(), 64);
}

#[test]
fn axi_dma_sg_pre_init_scenario() {
    const CTRL_BASE: u64 = 0x4300_0000;
    const MM2S_STATUS: u64 = CTRL_BASE + 0x04;
    const SR_SG_INCLD: u64 = 1 << 3;
    const BD_REGION: u64 = 0x9000_0000;
    const BD_REGION_SIZE: u64 = 0x400;
    const BD_STRIDE: u64 = 0x40;
    const NXTDESC_OFFSET: u64 = 0x00;
    const CONTROL_OFFSET: u64 = 0x18;
    const CTRL_TXSOF_MASK: u32 = 1 << 27;
    const CTRL_TXEOF_MASK: u32 = 1 << 26;

    let cfg = DummyBackendConfig {
        reg: RegSection { values: vec![RegValueEntry { addr: MM2S_STATUS, value: SR_SG_INCLD, width: 4 }], hooks: Vec::new() },
        ..DummyBackendConfig::empty()
    };
    let device = dummy_device(cfg);
    let dma = AxiDma::new(&device, CTRL_BASE, "dma0").unwrap();
    assert!(dma.has_sg());

    dma.init_bd_ring(DmaChannel::Mm2s, BD_REGION, BD_REGION_SIZE).unwrap();

    let bd_count = (BD_REGION_SIZE / BD_STRIDE) as usize;
    assert_eq!(bd_count, 16);
    for i in 0..bd_count {
        let addr = BD_REGION + i as u64 * BD_STRIDE;
        let next = u64::from_le_bytes(device.read_bytes(addr + NXTDESC_OFFSET, 8).unwrap().try_into().unwrap());
        assert_eq!(next, BD_REGION + ((i + 1) % bd_count) as u64 * BD_STRIDE);
    }

    let indices = dma.bd_ring_alloc(DmaChannel::Mm2s, 1).unwrap();
    let buffer_addr = BD_REGION + 0x1000;
    dma.config_tx_descs(DmaChannel::Mm2s, &indices, 1, 1, &[buffer_addr], 256, 256).unwrap();

    let bd_addr = BD_REGION + indices[0] as u64 * BD_STRIDE;
    let control = device.read32(bd_addr + CONTROL_OFFSET).unwrap();
    assert_ne!(control & CTRL_TXSOF_MASK, 0);
    assert_ne!(control & CTRL_TXEOF_MASK, 0);
    assert_eq!(control & 0x03FF_FFFF, 256);
}
