//! AXI DMA: two independent channels (MM2S host-to-device-stream,
//! S2MM device-stream-to-host), each drivable in chunked simple mode
//! or full Scatter/Gather.
//!
//! Register map (common layout, channels offset by 0x30): `CONTROL`
//! +0x00, `STATUS` +0x04, `CURDESC` +0x08 (64-bit), `TAILDESC` +0x10
//! (64-bit), `SA`/`DA` +0x18 (64-bit), `LENGTH` +0x28. `SG_CTL` sits at
//! the shared 0x2C slot between the two channel blocks; this driver
//! never touches it — coalescing lives in each channel's own `CONTROL`
//! bits 16..31, which is the field this driver actually programs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use crate::constants::{
    BD_SIZE, CTRL_TXEOF_MASK, CTRL_TXSOF_MASK, DEFAULT_BUF_LEN_REG_WIDTH, DEFAULT_DATA_WIDTH_BYTES, SG_IRQ_DELAY,
};
use crate::device::Device;
use crate::error::{ClapError, Result};
use crate::ip_cores::bd_ring::{BdRing, DmaChannel, RunState};
use crate::ip_cores::descriptor::SGDescriptor;
use crate::register::HasStatus;
use crate::register_control::RegisterControlBase;
use crate::watchdog::WatchDog;

const MM2S_BASE: u64 = 0x00;
const S2MM_BASE: u64 = 0x30;

const CONTROL: u64 = 0x00;
const STATUS: u64 = 0x04;
const CURDESC: u64 = 0x08;
const TAILDESC: u64 = 0x10;
const BUFFER_ADDR: u64 = 0x18;
const LENGTH: u64 = 0x28;

const CR_RS: u32 = 1 << 0;
const CR_RESET: u32 = 1 << 2;
const CR_IOC_IRQ_EN: u32 = 1 << 12;
const CR_DLY_IRQ_EN: u32 = 1 << 13;
const CR_ERR_IRQ_EN: u32 = 1 << 14;
const CR_IRQ_THRESHOLD_MASK: u32 = 0xFF << 16;
const CR_IRQ_DELAY_MASK: u32 = 0xFFu32 << 24;

const SR_HALTED: u32 = 1 << 0;
const SR_IDLE: u32 = 1 << 1;
const SR_SG_INCLD: u32 = 1 << 3;
const SR_DMA_INT_ERR: u32 = 1 << 4;
const SR_DMA_SLV_ERR: u32 = 1 << 5;
const SR_DMA_DEC_ERR: u32 = 1 << 6;
const SR_SG_INT_ERR: u32 = 1 << 8;
const SR_SG_SLV_ERR: u32 = 1 << 9;
const SR_SG_DEC_ERR: u32 = 1 << 10;
const SR_IOC_IRQ: u32 = 1 << 12;
const SR_DLY_IRQ: u32 = 1 << 13;
const SR_ERR_IRQ: u32 = 1 << 14;
const SR_ERR_ALL: u32 = SR_DMA_INT_ERR | SR_DMA_SLV_ERR | SR_DMA_DEC_ERR | SR_SG_INT_ERR | SR_SG_SLV_ERR | SR_SG_DEC_ERR;
const SR_IRQ_ALL: u32 = SR_IOC_IRQ | SR_DLY_IRQ | SR_ERR_IRQ;

fn base_of(channel: DmaChannel) -> u64 {
    match channel {
        DmaChannel::Mm2s => MM2S_BASE,
        DmaChannel::S2mm => S2MM_BASE,
    }
}

/// One `(channel, addr, length)` entry of a simple-mode transfer split
/// at `max_transfer_length`.
#[derive(Debug, Clone, Copy)]
pub struct TransferChunk {
    pub channel: DmaChannel,
    pub addr: u64,
    pub length: u32,
}

/// One S2MM completion: requested vs. hardware-reported length (the
/// engine overwrites `LENGTH` with actual bytes written for stream
/// sources, which may fall short of what was requested).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkResult {
    pub expected: u32,
    pub actual: u32,
}

#[derive(Debug, Default)]
pub struct ChunkResults(pub Vec<ChunkResult>);

impl ChunkResults {
    pub fn total_transferred_bytes(&self) -> u64 {
        self.0.iter().map(|r| r.actual as u64).sum()
    }
}

/// Polls a channel's `STATUS` register for the [`WatchDog`] in polling
/// mode: done once the engine reports idle or latches an error.
struct DmaStatusPoll {
    ctrl: RegisterControlBase,
    status_offset: u64,
}

impl HasStatus for DmaStatusPoll {
    fn poll_done(&mut self) -> bool {
        match self.ctrl.read_register_raw(self.status_offset, 4) {
            Ok(v) => (v as u32) & (SR_IOC_IRQ | SR_DLY_IRQ | SR_ERR_ALL) != 0,
            Err(_) => true,
        }
    }
}

struct ChannelState {
    channel: DmaChannel,
    base: u64,
    watchdog: Mutex<WatchDog>,
    queue: Mutex<VecDeque<TransferChunk>>,
    current: Mutex<Option<TransferChunk>>,
    results: Mutex<Vec<ChunkResult>>,
    ring: Mutex<Option<BdRing>>,
}

impl ChannelState {
    fn new(channel: DmaChannel) -> Self {
        Self {
            channel,
            base: base_of(channel),
            watchdog: Mutex::new(WatchDog::new(
                match channel {
                    DmaChannel::Mm2s => "axidma.mm2s",
                    DmaChannel::S2mm => "axidma.s2mm",
                },
                Box::new(crate::interrupt::DummyUserInterrupt::new()),
            )),
            queue: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            results: Mutex::new(Vec::new()),
            ring: Mutex::new(None),
        }
    }
}

/// The AXI DMA IP core: owns the shared `CONTROL`/`STATUS` register
/// file plus one [`ChannelState`] per direction. Scatter/Gather state
/// (the [`BdRing`]) only exists once [`AxiDma::init_bd_ring`] has been
/// called for that channel.
pub struct AxiDma {
    ctrl: RegisterControlBase,
    has_sg: bool,
    buf_len_reg_width: u32,
    data_width_bytes: [u32; 2],
    has_dre: [bool; 2],
    max_transfer_length: [u32; 2],
    mm2s: ChannelState,
    s2mm: ChannelState,
    self_weak: Mutex<Weak<AxiDma>>,
}

fn channel_index(channel: DmaChannel) -> usize {
    match channel {
        DmaChannel::Mm2s => 0,
        DmaChannel::S2mm => 1,
    }
}

impl AxiDma {
    /// Builds the driver and runs best-effort UIO auto-detection for
    /// `xlnx,sg-length-width` (buffer-length register width, default
    /// [`DEFAULT_BUF_LEN_REG_WIDTH`]), per-channel `xlnx,datawidth`
    /// (default [`DEFAULT_DATA_WIDTH_BYTES`]) and `xlnx,include-dre`.
    /// Any UIO miss degrades silently to the default, matching every
    /// other auto-detection path in this crate.
    pub fn new(device: &Arc<Device>, ctrl_base_offset: u64, name: impl Into<String>) -> Result<Arc<Self>> {
        let name = name.into();
        let ctrl = RegisterControlBase::new(device, ctrl_base_offset, name.clone());

        let buf_len_reg_width = ctrl
            .device_handle()?
            .backend()
            .read_uio_property(ctrl_base_offset, "xlnx,sg-length-width")
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_BUF_LEN_REG_WIDTH);

        let mut data_width_bytes = [DEFAULT_DATA_WIDTH_BYTES; 2];
        let mut has_dre = [false; 2];
        for (idx, base) in [MM2S_BASE, S2MM_BASE].into_iter().enumerate() {
            let width_prop = ctrl.dma_channel_property(base, "xlnx,datawidth");
            if let Ok(bits) = ctrl.device_handle()?.backend().read_uio_property(ctrl_base_offset, &width_prop) {
                data_width_bytes[idx] = (bits as u32 / 8).max(1);
            }
            let dre_prop = ctrl.dma_channel_property(base, "xlnx,include-dre");
            has_dre[idx] = ctrl.device_handle()?.backend().check_uio_property_exists(ctrl_base_offset, &dre_prop);
        }

        let mut max_transfer_length = [0u32; 2];
        for idx in 0..2 {
            max_transfer_length[idx] = ((1u64 << buf_len_reg_width) / data_width_bytes[idx] as u64) as u32;
        }

        let status_word = ctrl.read_register_raw(MM2S_BASE + STATUS, 4)? as u32;
        let has_sg = status_word & SR_SG_INCLD != 0;

        Ok(Arc::new_cyclic(|weak| Self {
            ctrl,
            has_sg,
            buf_len_reg_width,
            data_width_bytes,
            has_dre,
            max_transfer_length,
            mm2s: ChannelState::new(DmaChannel::Mm2s),
            s2mm: ChannelState::new(DmaChannel::S2mm),
            self_weak: Mutex::new(weak.clone()),
        }))
    }

    pub fn has_sg(&self) -> bool {
        self.has_sg
    }

    pub fn max_transfer_length(&self, channel: DmaChannel) -> u32 {
        self.max_transfer_length[channel_index(channel)]
    }

    pub fn has_dre(&self, channel: DmaChannel) -> bool {
        self.has_dre[channel_index(channel)]
    }

    pub fn data_width_bytes(&self, channel: DmaChannel) -> u32 {
        self.data_width_bytes[channel_index(channel)]
    }

    fn channel(&self, channel: DmaChannel) -> &ChannelState {
        match channel {
            DmaChannel::Mm2s => &self.mm2s,
            DmaChannel::S2mm => &self.s2mm,
        }
    }

    fn control_offset(&self, channel: DmaChannel) -> u64 {
        self.channel(channel).base + CONTROL
    }

    fn status_offset(&self, channel: DmaChannel) -> u64 {
        self.channel(channel).base + STATUS
    }

    fn read_status(&self, channel: DmaChannel) -> Result<u32> {
        Ok(self.ctrl.read_register_raw(self.status_offset(channel), 4)? as u32)
    }

    fn read_control(&self, channel: DmaChannel) -> Result<u32> {
        Ok(self.ctrl.read_register_raw(self.control_offset(channel), 4)? as u32)
    }

    fn write_control(&self, channel: DmaChannel, value: u32) -> Result<()> {
        self.ctrl.write_register_raw(self.control_offset(channel), value as u64, 4, false)
    }

    /// `IRQThreshold`/`IRQDelay` (control bits 16..31): the count of
    /// completions (or BDs, in SG mode) coalesced into one interrupt.
    /// Rejects `threshold == 0`, matching the hardware's requirement of
    /// at least one.
    pub fn set_coalesce(&self, channel: DmaChannel, threshold: u8, delay: u8) -> Result<()> {
        if threshold == 0 {
            return Err(ClapError::IpCore { core: "AxiDma", detail: "IRQThreshold must be at least 1".into() });
        }
        let mut v = self.read_control(channel)?;
        v &= !(CR_IRQ_THRESHOLD_MASK | CR_IRQ_DELAY_MASK);
        v |= (threshold as u32) << 16;
        v |= (delay as u32) << 24;
        self.write_control(channel, v)
    }

    /// Combined simple-mode start: issues MM2S and/or S2MM transfers
    /// (pass `len == 0` to skip a direction), each split into
    /// `ceil(len / max_transfer_length)` chunks queued in order.
    pub fn start(self: &Arc<Self>, mm2s_addr: u64, mm2s_len: u64, s2mm_addr: u64, s2mm_len: u64) -> Result<()> {
        if mm2s_len > 0 {
            self.start_channel(DmaChannel::Mm2s, mm2s_addr, mm2s_len)?;
        }
        if s2mm_len > 0 {
            self.start_channel(DmaChannel::S2mm, s2mm_addr, s2mm_len)?;
        }
        Ok(())
    }

    /// Simple-mode start for one channel. Fails if Scatter/Gather is
    /// enabled on this engine (`start_bd_ring` is the SG entry point) or
    /// if the channel's watchdog is already running.
    pub fn start_channel(self: &Arc<Self>, channel: DmaChannel, addr: u64, len: u64) -> Result<()> {
        if self.has_sg {
            return Err(ClapError::IpCore {
                core: "AxiDma",
                detail: "start_channel is simple-mode only; this engine has Scatter/Gather enabled".into(),
            });
        }

        let state = self.channel(channel);
        if state.watchdog.lock().unwrap().is_running() {
            return Err(ClapError::WatchDog(format!("{channel:?}: already running")));
        }

        let max_len = self.max_transfer_length(channel) as u64;
        let mut queue = VecDeque::new();
        let mut remaining = len;
        let mut offset = 0u64;
        while remaining > 0 {
            let chunk_len = remaining.min(max_len);
            queue.push_back(TransferChunk { channel, addr: addr + offset, length: chunk_len as u32 });
            offset += chunk_len;
            remaining -= chunk_len;
        }
        *state.queue.lock().unwrap() = queue;
        state.results.lock().unwrap().clear();

        // clear the previous status snapshot (write-1-to-clear the sticky bits)
        let prev_status = self.read_status(channel)?;
        self.ctrl.write_register_raw(self.status_offset(channel), (prev_status & SR_IRQ_ALL) as u64, 4, false)?;

        let mut control = self.read_control(channel)?;
        control |= CR_RS;
        self.write_control(channel, control)?;

        self.program_next_chunk(channel)?;

        let status_poll = DmaStatusPoll {
            ctrl: RegisterControlBase::new(&self.ctrl.device_handle()?, self.ctrl.ctrl_base_offset(), format!("{channel:?}.status")),
            status_offset: self.status_offset(channel),
        };

        let weak = self.self_weak.lock().unwrap().clone();
        let finish_channel = channel;
        let mut wd = state.watchdog.lock().unwrap();
        wd.unset_status_register();
        wd.set_status_register(Box::new(status_poll));
        wd.set_finish_callback(move || {
            let Some(this) = weak.upgrade() else { return true };
            this.on_chunk_finished(finish_channel)
        });
        wd.start()
    }

    /// Writes `SA`/`DA` and `LENGTH` for the front of the chunk queue,
    /// which arms the engine (the `LENGTH` write is the trigger).
    fn program_next_chunk(&self, channel: DmaChannel) -> Result<()> {
        let state = self.channel(channel);
        let next = state.queue.lock().unwrap().pop_front();
        let Some(chunk) = next else {
            return Ok(());
        };
        self.ctrl.write_register_raw(state.base + BUFFER_ADDR, chunk.addr, 8, false)?;
        self.ctrl.write_register_raw(state.base + LENGTH, chunk.length as u64, 4, false)?;
        *state.current.lock().unwrap() = Some(chunk);
        Ok(())
    }

    /// Finish callback invoked by the channel's [`WatchDog`] on every
    /// completion. For S2MM, records the just-finished chunk's actual
    /// transferred length (hardware overwrites `LENGTH`). Programs the
    /// next queued chunk and returns `false` to keep the watchdog
    /// running, or returns `true` once the queue has drained.
    fn on_chunk_finished(&self, channel: DmaChannel) -> bool {
        let state = self.channel(channel);
        if let Some(chunk) = state.current.lock().unwrap().take() {
            if channel == DmaChannel::S2mm {
                let actual = self.ctrl.read_register_raw(state.base + LENGTH, 4).map(|v| v as u32).unwrap_or(chunk.length);
                state.results.lock().unwrap().push(ChunkResult { expected: chunk.length, actual });
            }
        }

        if state.queue.lock().unwrap().is_empty() {
            return true;
        }
        if self.program_next_chunk(channel).is_err() {
            return true;
        }
        false
    }

    /// Blocks until the channel's in-flight simple-mode transfer (and
    /// every queued chunk after it) completes.
    pub fn wait_for_finish(&self, channel: DmaChannel, timeout_ms: i32) -> Result<bool> {
        self.channel(channel).watchdog.lock().unwrap().wait_for_finish(timeout_ms)
    }

    pub fn chunk_results(&self, channel: DmaChannel) -> ChunkResults {
        ChunkResults(self.channel(channel).results.lock().unwrap().clone())
    }

    /// Clears `RS` and waits for any in-flight watchdog to join. Resets
    /// the BD ring to idle if Scatter/Gather was in use.
    pub fn stop(&self, channel: DmaChannel) -> Result<()> {
        let mut control = self.read_control(channel)?;
        control &= !CR_RS;
        self.write_control(channel, control)?;

        let mut wd = self.channel(channel).watchdog.lock().unwrap();
        if wd.is_running() {
            wd.wait_for_finish(-1)?;
        }
        drop(wd);

        if let Some(ring) = self.channel(channel).ring.lock().unwrap().as_mut() {
            ring.set_run_state(RunState::Idle);
        }
        Ok(())
    }

    /// Pulses `CONTROL.Reset` and spins until hardware self-clears it.
    /// Per this driver's open design question, the spin is intentionally
    /// unbounded — the original leaves it that way and callers who want
    /// a deadline should race this against their own timeout thread.
    pub fn reset(&self, channel: DmaChannel) -> Result<()> {
        self.write_control(channel, CR_RESET)?;
        loop {
            if self.read_control(channel)? & CR_RESET == 0 {
                break;
            }
        }
        Ok(())
    }

    pub fn enable_interrupts(&self, channel: DmaChannel, ioc: bool, delay: bool, err: bool) -> Result<()> {
        let mut v = self.read_control(channel)?;
        if ioc {
            v |= CR_IOC_IRQ_EN;
        }
        if delay {
            v |= CR_DLY_IRQ_EN;
        }
        if err {
            v |= CR_ERR_IRQ_EN;
        }
        self.write_control(channel, v)
    }

    pub fn disable_interrupts(&self, channel: DmaChannel) -> Result<()> {
        let mut v = self.read_control(channel)?;
        v &= !(CR_IOC_IRQ_EN | CR_DLY_IRQ_EN | CR_ERR_IRQ_EN);
        self.write_control(channel, v)
    }

    pub fn is_halted(&self, channel: DmaChannel) -> Result<bool> {
        Ok(self.read_status(channel)? & SR_HALTED != 0)
    }

    pub fn is_idle(&self, channel: DmaChannel) -> Result<bool> {
        Ok(self.read_status(channel)? & SR_IDLE != 0)
    }

    pub fn has_errors(&self, channel: DmaChannel) -> Result<bool> {
        Ok(self.read_status(channel)? & SR_ERR_ALL != 0)
    }

    // ---- Scatter/Gather ----------------------------------------------

    /// `bd_setup`: builds (or reinitializes) the ring covering
    /// `[mem_base, mem_base + mem_size)` at 64-byte stride. Requires
    /// `DMASR.SGIncld` and `mem_base` 64-byte aligned.
    pub fn init_bd_ring(&self, channel: DmaChannel, mem_base: u64, mem_size: u64) -> Result<()> {
        if !self.has_sg {
            return Err(ClapError::IpCore { core: "AxiDma", detail: "Scatter/Gather is not included in this engine".into() });
        }
        if mem_base % BD_SIZE != 0 {
            return Err(ClapError::IpCore { core: "AxiDma", detail: format!("BD memory base 0x{mem_base:x} is not 64-byte aligned") });
        }

        let bd_count = mem_size.div_ceil(BD_SIZE) as usize;
        let state = self.channel(channel);
        let device = self.ctrl.device_handle()?;

        let reuse = state.ring.lock().unwrap().as_ref().map(|r| r.all_cnt() as usize) == Some(bd_count);
        if reuse {
            let mut guard = state.ring.lock().unwrap();
            let ring = guard.as_mut().unwrap();
            ring.reinit(false);
            return Ok(());
        }

        let has_dre = self.has_dre(channel);
        let data_width = self.data_width_bytes(channel);
        let mut descriptors = Vec::with_capacity(bd_count);
        for i in 0..bd_count {
            let addr = mem_base + i as u64 * BD_SIZE;
            let mut desc = SGDescriptor::new(&device, addr, format!("{channel:?}.bd{i}"))?;
            let next_addr = mem_base + ((i + 1) % bd_count) as u64 * BD_SIZE;
            desc.set_next_desc_addr(next_addr)?;
            desc.set_has_sts_ctrl_strm(0)?;
            desc.set_has_dre(((has_dre as u32) << crate::constants::HAS_DRE_SHIFT) | data_width)?;
            descriptors.push(desc);
        }

        let mut ring = BdRing::new(channel);
        ring.set_has_dre(has_dre);
        ring.set_data_width(data_width);
        ring.set_max_transfer_len(self.max_transfer_length(channel));
        ring.set_desc_ptr_offset(state.base + CURDESC);
        ring.set_tail_desc_offset(state.base + TAILDESC);
        ring.init(descriptors, false);

        self.set_coalesce(channel, 1, SG_IRQ_DELAY)?;
        *state.ring.lock().unwrap() = Some(ring);
        Ok(())
    }

    fn with_ring<T>(&self, channel: DmaChannel, f: impl FnOnce(&mut BdRing) -> Result<T>) -> Result<T> {
        let mut guard = self.channel(channel).ring.lock().unwrap();
        let ring = guard.as_mut().ok_or_else(|| ClapError::IpCore { core: "AxiDma", detail: "BD ring is not initialized".into() })?;
        f(ring)
    }

    /// Reserves `num_bd` consecutive BDs from the free list, returning
    /// their ring indices in hardware order.
    pub fn bd_ring_alloc(&self, channel: DmaChannel, num_bd: u32) -> Result<Vec<usize>> {
        self.with_ring(channel, |ring| {
            if ring.free_cnt() < num_bd {
                return Err(ClapError::IpCore { core: "AxiDma", detail: format!("not enough free BDs: need {num_bd}, have {}", ring.free_cnt()) });
            }
            let mut indices = Vec::with_capacity(num_bd as usize);
            let mut idx = ring.free_head();
            for _ in 0..num_bd {
                indices.push(idx);
                idx = ring.next_index(idx);
            }
            ring.set_free_head(idx);
            ring.set_free_cnt(ring.free_cnt() - num_bd);
            Ok(indices)
        })
    }

    /// Programs `num_pkts` TX packets of `bds_per_pkt` BDs each over
    /// `indices`. `remaining` starts at `payload_size` once and is
    /// threaded across every packet and BD (not reset per packet), so
    /// `length = min(remaining, max_pkt_byte_len)` capped at
    /// `max_transfer_length`; sets `buffer_addr` per BD (rejecting
    /// misalignment where DRE is absent), `TXSOF` on each packet's
    /// first BD, `TXEOF` on its last, and `id = packet index`.
    pub fn config_tx_descs(
        &self,
        channel: DmaChannel,
        indices: &[usize],
        bds_per_pkt: u32,
        num_pkts: u32,
        buffer_addrs: &[u64],
        max_pkt_byte_len: u32,
        payload_size: u64,
    ) -> Result<()> {
        let max_len = self.max_transfer_length(channel);
        self.with_ring(channel, |ring| {
            let mut cursor = 0usize;
            let mut remaining = payload_size;
            for pkt in 0..num_pkts {
                for bd_in_pkt in 0..bds_per_pkt {
                    let idx = indices[cursor];
                    let addr = buffer_addrs[cursor];
                    let bd = ring.descriptor_mut(idx);
                    if !bd.set_buffer_addr(addr)? {
                        return Err(ClapError::IpCore { core: "AxiDma", detail: format!("buffer address 0x{addr:x} is misaligned and this channel has no DRE") });
                    }
                    let len = remaining.min(max_pkt_byte_len as u64) as u32;
                    if !bd.set_length(len, max_len)? {
                        return Err(ClapError::IpCore { core: "AxiDma", detail: format!("packet length {len} exceeds max_transfer_length {max_len}") });
                    }
                    remaining = remaining.saturating_sub(len as u64);

                    let mut bits = 0u32;
                    if bd_in_pkt == 0 {
                        bits |= CTRL_TXSOF_MASK;
                    }
                    if bd_in_pkt == bds_per_pkt - 1 {
                        bits |= CTRL_TXEOF_MASK;
                    }
                    bd.set_control_bits(bits)?;
                    bd.set_id(pkt)?;
                    cursor += 1;
                }
            }
            Ok(())
        })
    }

    /// Programs RX BDs: `buffer_addr`/`length` as above, no SOF/EOF
    /// bits, `id` = BD index within `indices`.
    pub fn config_rx_descs(&self, channel: DmaChannel, indices: &[usize], buffer_addrs: &[u64], max_pkt_byte_len: u32) -> Result<()> {
        let max_len = self.max_transfer_length(channel);
        self.with_ring(channel, |ring| {
            for (pos, &idx) in indices.iter().enumerate() {
                let addr = buffer_addrs[pos];
                let bd = ring.descriptor_mut(idx);
                if !bd.set_buffer_addr(addr)? {
                    return Err(ClapError::IpCore { core: "AxiDma", detail: format!("buffer address 0x{addr:x} is misaligned and this channel has no DRE") });
                }
                if !bd.set_length(max_pkt_byte_len, max_len)? {
                    return Err(ClapError::IpCore { core: "AxiDma", detail: format!("packet length {max_pkt_byte_len} exceeds max_transfer_length {max_len}") });
                }
                bd.set_control_bits(0)?;
                bd.set_id(pos as u32)?;
            }
            Ok(())
        })
    }

    /// `bd_ring_to_hw`: validates (unless `skip_bd_reset`) that the TX
    /// framing is intact and no BD has zero length, clears each BD's
    /// Completed bit, advances `hw_tail`/`hw_cnt`, and — if the ring is
    /// already running — kicks `TAILDESC`.
    pub fn bd_ring_to_hw(&self, channel: DmaChannel, indices: &[usize], skip_bd_reset: bool) -> Result<()> {
        let base = self.channel(channel).base;
        let tail_addr = self.with_ring(channel, |ring| {
            if !skip_bd_reset {
                if channel == DmaChannel::Mm2s {
                    let first = ring.descriptor_mut(indices[0]).control()?;
                    if first & CTRL_TXSOF_MASK == 0 {
                        return Err(ClapError::IpCore { core: "AxiDma", detail: "first BD of TX ring is missing TXSOF".into() });
                    }
                    let last = ring.descriptor_mut(*indices.last().unwrap()).control()?;
                    if last & CTRL_TXEOF_MASK == 0 {
                        return Err(ClapError::IpCore { core: "AxiDma", detail: "last BD of TX ring is missing TXEOF".into() });
                    }
                }
                for &idx in indices {
                    let bd = ring.descriptor_mut(idx);
                    if bd.length()? == 0 {
                        return Err(ClapError::IpCore { core: "AxiDma", detail: format!("BD {idx} has zero length") });
                    }
                    bd.clear_complete()?;
                }
            }

            let last_idx = *indices.last().unwrap();
            ring.set_hw_tail(last_idx);
            ring.set_hw_cnt(ring.hw_cnt() + indices.len() as u32);

            if ring.run_state() == RunState::Running {
                let addr = match ring.cyclic_bd() {
                    Some(cyclic) => ring.descriptor(cyclic).addr(),
                    None => ring.descriptor(last_idx).addr(),
                };
                Ok(Some(addr))
            } else {
                Ok(None)
            }
        })?;

        if let Some(addr) = tail_addr {
            self.ctrl.write_register_raw(base + TAILDESC, addr, 8, false)?;
        }
        Ok(())
    }

    /// `start_bd_ring`: `update_c_desc` (program `CURDESC` with the
    /// first not-yet-completed BD while halted) then `start_bd_ring_hw`
    /// (set `CONTROL.RS`, mark the ring Running, kick `TAILDESC`).
    pub fn start_bd_ring(&self, channel: DmaChannel) -> Result<()> {
        let base = self.channel(channel).base;

        if self.is_halted(channel)? {
            let restart_addr = self.with_ring(channel, |ring| Ok(ring.descriptor(ring.bd_restart()).addr()))?;
            self.ctrl.write_register_raw(base + CURDESC, restart_addr, 8, false)?;
        }

        let mut control = self.read_control(channel)?;
        control |= CR_RS;
        self.write_control(channel, control)?;

        if !self.is_halted(channel)? {
            let tail_addr = self.with_ring(channel, |ring| {
                ring.set_run_state(RunState::Running);
                let addr = match ring.cyclic_bd() {
                    Some(cyclic) => ring.descriptor(cyclic).addr(),
                    None => ring.descriptor(ring.hw_tail()).addr(),
                };
                Ok(addr)
            })?;
            self.ctrl.write_register_raw(base + TAILDESC, tail_addr, 8, false)?;
        }
        Ok(())
    }

    /// `start_sg_ext_descs`: installs a caller-supplied, already
    /// prepared ring (`has_ext_descs = true`) and kicks it off. Refuses
    /// unless the engine is currently idle or halted.
    pub fn start_sg_ext_descs(&self, channel: DmaChannel, descriptors: Vec<SGDescriptor>, num_bd_ready: usize) -> Result<()> {
        if !self.is_idle(channel)? && !self.is_halted(channel)? {
            return Err(ClapError::IpCore { core: "AxiDma", detail: "cannot install an external BD ring while the engine is running".into() });
        }
        if num_bd_ready == 0 || num_bd_ready > descriptors.len() {
            return Err(ClapError::IpCore { core: "AxiDma", detail: "num_bd_ready out of range for the supplied descriptors".into() });
        }

        let base = self.channel(channel).base;
        let state = self.channel(channel);

        let mut ring = BdRing::new(channel);
        ring.set_has_dre(self.has_dre(channel));
        ring.set_data_width(self.data_width_bytes(channel));
        ring.set_max_transfer_len(self.max_transfer_length(channel));
        ring.set_desc_ptr_offset(base + CURDESC);
        ring.set_tail_desc_offset(base + TAILDESC);
        ring.init(descriptors, true);
        ring.set_free_cnt(ring.all_cnt() - num_bd_ready as u32);
        ring.set_hw_cnt(num_bd_ready as u32);
        ring.set_hw_tail(num_bd_ready - 1);
        *state.ring.lock().unwrap() = Some(ring);

        self.set_coalesce(channel, 1, SG_IRQ_DELAY)?;

        let first_addr = self.with_ring(channel, |ring| Ok(ring.descriptor(0).addr()))?;
        self.ctrl.write_register_raw(base + CURDESC, first_addr, 8, false)?;

        self.start_bd_ring(channel)
    }
}
