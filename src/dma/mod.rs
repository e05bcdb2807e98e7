//! AXI DMA scatter-gather support
//!
//! - [`descriptor`]: descriptor word layout and a view over descriptor memory
//! - [`ring`]: the cyclic descriptor ring and the consumer cursor
//! - [`engine`]: S2MM channel control

pub mod descriptor;
pub mod engine;
pub mod ring;

pub use descriptor::SgDescriptor;
pub use engine::{AxiDmaRegs, DmaEngineController, EngineState, EngineStatus};
pub use ring::{DescriptorRingEntry, RingCursor, ScatterGatherRing};
