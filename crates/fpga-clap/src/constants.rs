//! Platform and protocol constants shared across backends and IP cores.

/// XDMA host buffers must be aligned to a 4096-byte boundary.
pub const XDMA_ALIGNMENT: u64 = 4096;

/// Width in bits of the AXI data path XDMA streams against.
pub const XDMA_AXI_DATA_WIDTH_BIT: u64 = 512;
pub const XDMA_AXI_DATA_WIDTH: u64 = XDMA_AXI_DATA_WIDTH_BIT / 8;

/// Streamed transfers are always issued at file offset 0.
pub const XDMA_STREAM_OFFSET: u64 = 0;

/// Sentinel meaning "use `Vec::len() * size_of::<T>()`" for transfer sizes.
pub const USE_VECTOR_SIZE: u64 = 0;

/// Block forever.
pub const WAIT_INFINITE: i32 = -1;

/// Sentinel for "same as the element's start bit" in single-bit registrations.
pub const SAME_AS_START_BIT: u8 = 0xFF;

pub const XDMA_CTRL_BASE: u64 = 0x0;
pub const XDMA_CTRL_SIZE: u64 = 0x100;

/// `man 2 write`: Linux transfers at most this many bytes per syscall.
pub const RW_MAX_SIZE: u64 = 0x7FFF_F000;

/// Sentinel meaning "use the whole remaining region size".
pub const USE_MEMORY_SIZE: u64 = 0;

/// Default memory-manager alignment in bytes.
pub const DEFAULT_ALIGNMENT: u64 = 0x40;

/// Number of free-list entries above which the allocator coalesces.
pub const COALESCE_THRESHOLD: usize = 4;

/// Minimum alignment of a buffer-descriptor ring / individual BD.
pub const BD_ALIGNMENT: u64 = 0x40;

/// Size in bytes of one hardware buffer descriptor.
pub const BD_SIZE: u64 = 0x40;

/// Path of the process-wide solo-run lock file.
pub const SOLO_RUN_LOCK_PATH: &str = "/tmp/clap.lock";

/// Environment variable pointing at a JSON config for the Dummy backend.
pub const DUMMY_BACKEND_CONFIG_ENV: &str = "CLAP_DUMMY_BACKEND_CONFIG";

/// Default in-memory size for a Dummy backend with no config file.
pub const DUMMY_DEFAULT_MEMORY_SIZE: usize = 0x1_0000;

/// Default AXI DMA buffer-length register width, in bits (before UIO
/// auto-detection overrides it).
pub const DEFAULT_BUF_LEN_REG_WIDTH: u32 = 14;

/// Default AXI DMA data width, in bytes, for either channel.
pub const DEFAULT_DATA_WIDTH_BYTES: u32 = 4;

/// A buffer descriptor's `control` word: bit 27 marks the first BD of a
/// TX packet (Start Of Frame).
pub const CTRL_TXSOF_MASK: u32 = 1 << 27;
/// A buffer descriptor's `control` word: bit 26 marks the last BD of a
/// TX packet (End Of Frame).
pub const CTRL_TXEOF_MASK: u32 = 1 << 26;
/// Mask of the bits `SetControlBits` is allowed to touch (SOF | EOF).
pub const CTRL_ALL_MASK: u32 = CTRL_TXSOF_MASK | CTRL_TXEOF_MASK;
/// A buffer descriptor's `control` word: bits 0..25 hold the transfer length.
pub const MAX_LENGTH_MASK: u32 = 0x03FF_FFFF;
/// A buffer descriptor's `status` word: bit 31 marks the BD complete.
pub const BD_COMPLETE_MASK: u32 = 1 << 31;
/// Shift applied to the DRE-present flag when packed into `has_dre`.
pub const HAS_DRE_SHIFT: u32 = 8;
/// No interrupt coalescing delay beyond the threshold by default.
pub const SG_IRQ_DELAY: u8 = 0;
