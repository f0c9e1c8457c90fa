//! Nothing lives here; this crate exists to hold the property and
//! scenario suites under `tests/` that exercise `fpga_clap` as an
//! outside consumer would.
