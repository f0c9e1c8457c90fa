//! Ring of buffer descriptors for one AXI DMA channel.
//!
//! This is a thin data holder — cursors, counts and the descriptor
//! storage — with no I/O of its own; [`super::dma::AxiDma`] is the
//! orchestrator that walks it (mirroring the original's split between a
//! dumb nested `BdRing` struct and the free functions on `AxiDMA` that
//! operate on it).
//!
//! Descriptors are addressed by index into `descriptors` rather than by
//! raw pointer; "the next BD" is `(index + 1) % descriptors.len()`,
//! which is the same modulo-arithmetic chaining the wire-level
//! `next_desc` fields encode, just without a pointer to dereference.
//! Rust's ownership model makes the original's `Owned` vs `Borrowed`
//! (caller-supplied) distinction moot for the destructor path — `Vec`
//! drops its contents either way — so it is kept as a plain
//! `has_ext_descs` flag, which is all the rest of the ring logic
//! (`CheckBdMemAddr`, `ReInit`'s free-count reset) actually inspects.

use crate::ip_cores::descriptor::SGDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaChannel {
    Mm2s,
    S2mm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

pub const SEPARATION: u64 = crate::constants::BD_ALIGNMENT;

pub struct BdRing {
    channel: DmaChannel,
    descriptors: Vec<SGDescriptor>,
    has_ext_descs: bool,

    run_state: RunState,
    has_sts_cntrl_strm: u32,
    has_dre: bool,
    data_width: u32,
    max_transfer_len: u32,

    free_head: usize,
    hw_tail: usize,
    bd_restart: usize,
    cyclic_bd: Option<usize>,

    free_cnt: u32,
    hw_cnt: u32,
    all_cnt: u32,
    ring_index: u32,
    cyclic: bool,

    desc_ptr_offset: u64,
    tail_desc_offset: u64,
}

impl BdRing {
    pub fn new(channel: DmaChannel) -> Self {
        Self {
            channel,
            descriptors: Vec::new(),
            has_ext_descs: false,
            run_state: RunState::Idle,
            has_sts_cntrl_strm: 0,
            has_dre: false,
            data_width: 0,
            max_transfer_len: 0,
            free_head: 0,
            hw_tail: 0,
            bd_restart: 0,
            cyclic_bd: None,
            free_cnt: 0,
            hw_cnt: 0,
            all_cnt: 0,
            ring_index: 0,
            cyclic: false,
            desc_ptr_offset: 0,
            tail_desc_offset: 0,
        }
    }

    pub fn channel(&self) -> DmaChannel {
        self.channel
    }

    pub fn is_rx_channel(&self) -> bool {
        self.channel == DmaChannel::S2mm
    }

    /// Empties the ring back to its just-constructed state. Descriptor
    /// storage itself is dropped normally by `Vec`.
    pub fn reset(&mut self) {
        self.descriptors.clear();
        self.run_state = RunState::Idle;
        self.free_head = 0;
        self.hw_tail = 0;
        self.bd_restart = 0;
        self.cyclic_bd = None;
        self.free_cnt = 0;
        self.hw_cnt = 0;
        self.all_cnt = 0;
        self.ring_index = 0;
        self.cyclic = false;
    }

    /// Installs freshly built (or caller-supplied) descriptors and
    /// re-initializes cursors.
    pub fn init(&mut self, descriptors: Vec<SGDescriptor>, use_ext_descs: bool) {
        self.all_cnt = descriptors.len() as u32;
        self.free_cnt = self.all_cnt;
        self.descriptors = descriptors;
        self.run_state = RunState::Idle;
        self.cyclic_bd = None;
        self.reinit(use_ext_descs);
    }

    /// Re-arms cursors over the already-installed descriptors, e.g. when
    /// a same-size ring is being reused.
    pub fn reinit(&mut self, use_ext_descs: bool) {
        self.has_ext_descs = use_ext_descs;
        self.free_head = 0;
        self.hw_tail = 0;
        self.bd_restart = 0;
        self.free_cnt = if use_ext_descs { 0 } else { self.all_cnt };
        self.hw_cnt = 0;
    }

    pub fn set_has_dre(&mut self, dre: bool) {
        self.has_dre = dre;
    }

    pub fn has_dre(&self) -> bool {
        self.has_dre
    }

    pub fn set_data_width(&mut self, width: u32) {
        self.data_width = width;
    }

    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    pub fn set_max_transfer_len(&mut self, len: u32) {
        self.max_transfer_len = len;
    }

    pub fn max_transfer_len(&self) -> u32 {
        self.max_transfer_len
    }

    pub fn set_desc_ptr_offset(&mut self, offset: u64) {
        self.desc_ptr_offset = offset;
    }

    pub fn desc_ptr_offset(&self) -> u64 {
        self.desc_ptr_offset
    }

    pub fn set_tail_desc_offset(&mut self, offset: u64) {
        self.tail_desc_offset = offset;
    }

    pub fn tail_desc_offset(&self) -> u64 {
        self.tail_desc_offset
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn set_run_state(&mut self, state: RunState) {
        self.run_state = state;
    }

    pub fn all_cnt(&self) -> u32 {
        self.all_cnt
    }

    pub fn free_cnt(&self) -> u32 {
        self.free_cnt
    }

    pub fn hw_cnt(&self) -> u32 {
        self.hw_cnt
    }

    pub fn set_free_cnt(&mut self, cnt: u32) {
        self.free_cnt = cnt;
    }

    pub fn set_hw_cnt(&mut self, cnt: u32) {
        self.hw_cnt = cnt;
    }

    pub fn ring_index(&self) -> u32 {
        self.ring_index
    }

    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    pub fn set_cyclic_bd(&mut self, index: Option<usize>) {
        self.cyclic_bd = index;
        self.cyclic = index.is_some();
    }

    pub fn cyclic_bd(&self) -> Option<usize> {
        self.cyclic_bd
    }

    pub fn free_head(&self) -> usize {
        self.free_head
    }

    pub fn set_free_head(&mut self, index: usize) {
        self.free_head = index;
    }

    pub fn hw_tail(&self) -> usize {
        self.hw_tail
    }

    pub fn set_hw_tail(&mut self, index: usize) {
        self.hw_tail = index;
    }

    pub fn bd_restart(&self) -> usize {
        self.bd_restart
    }

    pub fn set_bd_restart(&mut self, index: usize) {
        self.bd_restart = index;
    }

    pub fn has_ext_descs(&self) -> bool {
        self.has_ext_descs
    }

    pub fn has_sts_cntrl_strm(&self) -> u32 {
        self.has_sts_cntrl_strm
    }

    pub fn descriptors(&self) -> &[SGDescriptor] {
        &self.descriptors
    }

    pub fn descriptors_mut(&mut self) -> &mut [SGDescriptor] {
        &mut self.descriptors
    }

    pub fn descriptor_mut(&mut self, index: usize) -> &mut SGDescriptor {
        &mut self.descriptors[index]
    }

    pub fn descriptor(&self, index: usize) -> &SGDescriptor {
        &self.descriptors[index]
    }

    /// Index of the BD following `index`, wrapping around the ring.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.descriptors.len().max(1)
    }

    /// `SetHwTail`'s `numBd`-th BD: the last BD of the `numBd` just
    /// handed to hardware, counted from `free_head` at call time.
    pub fn update_hw_tail(&mut self, num_bd: u32) {
        if num_bd == 0 {
            return;
        }
        let mut idx = self.free_head;
        for _ in 0..num_bd - 1 {
            idx = self.next_index(idx);
        }
        self.hw_tail = idx;
    }
}
