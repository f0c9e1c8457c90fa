//! Drivers for the individual IP cores a CLAP-based design composes.

pub mod apctrl;
pub mod bd_ring;
pub mod descriptor;
pub mod dma;
pub mod gpio;
pub mod intc;

pub use apctrl::ApCtrl;
pub use bd_ring::{BdRing, DmaChannel, RunState};
pub use descriptor::SGDescriptor;
pub use dma::{AxiDma, ChunkResult, ChunkResults, TransferChunk};
pub use gpio::{AxiGpio, GpioChannel};
pub use intc::AxiInterruptController;
