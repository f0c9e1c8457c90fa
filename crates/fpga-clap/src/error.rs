//! Crate-wide error taxonomy.
//!
//! Every fallible operation in `fpga_clap` returns a [`ClapError`] rather
//! than panicking; panics are reserved for invariant violations that
//! indicate a bug in this crate rather than a runtime condition (see the
//! module docs on `register` for the one exception in the object model).

use thiserror::Error;

/// Errors surfaced by backends, the register model, interrupts, the
/// watchdog and the IP core drivers.
///
/// Each variant keeps enough context (addresses, sizes, errno) to be
/// reported directly to a user, matching the "class tag, method, operand"
/// style of error message the runtime has always produced.
#[derive(Debug, Error)]
pub enum ClapError {
    #[error("backend I/O error in {method}: addr=0x{addr:x} size=0x{size:x}: {source}")]
    BackendIo {
        method: &'static str,
        addr: u64,
        size: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("backend I/O error in {method}: addr=0x{addr:x} size=0x{size:x}: short transfer, {actual} of {size} bytes")]
    ShortTransfer {
        method: &'static str,
        addr: u64,
        size: u64,
        actual: u64,
    },

    #[error("host buffer at 0x{addr:x} is not aligned to the backend's required {required}-byte alignment")]
    Alignment { addr: u64, required: u64 },

    #[error("memory allocator error: {0}")]
    Memory(String),

    #[error("address 0x{addr:x} (len 0x{len:x}) is out of range of the mapped region")]
    OutOfRange { addr: u64, len: u64 },

    #[error("cannot register a {width}-byte wide register, the maximum supported width is 8 bytes")]
    RegisterWidth { width: usize },

    #[error("register element \"{name}\" [{start}:{end}] overlaps already registered bits")]
    RegisterOverlap { name: String, start: u8, end: u8 },

    #[error("user interrupt error: {0}")]
    UserInterrupt(String),

    #[error("watchdog error: {0}")]
    WatchDog(String),

    #[error("IP core protocol violation in {core}: {detail}")]
    IpCore { core: &'static str, detail: String },

    #[error("UIO property error: {0}")]
    Uio(#[from] UioError),

    #[error("solo-run lock error: {0}")]
    SoloRun(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("the owning Device has been dropped")]
    DeviceGone,
}

/// UIO devicetree property lookups are best-effort: callers fall back to
/// explicit ids when a property is missing, so this is returned inside a
/// `Result` rather than ever being allowed to panic or be silently
/// defaulted beyond what the caller explicitly asked for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UioError {
    #[error("UIO property \"{0}\" not found")]
    NotFound(String),

    #[error("UIO property \"{0}\" could not be parsed: {1}")]
    ParseFailure(String, String),

    #[error("backend does not support UIO property lookups")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, ClapError>;
