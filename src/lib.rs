//! Streaming AXI DMA host driver
//!
//! Host-side control of an FPGA data path in which an AXI DMA engine
//! (S2MM channel, scatter-gather, cyclic mode) streams packets from an AXI
//! Traffic Generator into host-visible memory.
//!
//! # Architecture
//!
//! The driver is organized bottom-up:
//!
//! 1. **Register windows** ([`register`]): 32-bit register access over UIO
//!    devices or an XDMA PCIe bridge
//! 2. **DMA buffers** ([`buffer`]): u-dma-buf host memory or FPGA memory read
//!    over XDMA
//! 3. **DMA layer** ([`dma`]): descriptor ring and engine control
//! 4. **Peripherals** ([`peripheral`]): traffic generator and status GPIO
//! 5. **Data handler** ([`handler`]): concurrent consumer with packet
//!    validation and cooperative cancellation
//! 6. **Session** ([`session`]): one run from arming to teardown
//!
//! # Example
//!
//! ```ignore
//! use ph_axi_dma::{DmaSession, HardwareMap, SessionConfig};
//!
//! let config = SessionConfig::new()
//!     .with_packet_count(50)
//!     .with_packet_len(1024);
//! let mut session = DmaSession::open(config, &HardwareMap::default())?;
//!
//! let summary = session.run(|| false)?;
//! println!("ok = {}, total = {}", summary.packets_ok, summary.packets_total);
//! ```
//!
//! # Threads
//!
//! A run uses two threads: the caller, which arms the hardware and
//! supervises, and the data handler. They share register windows, the ring
//! and the buffer through `Arc`, a [`StopToken`] for cancellation and a
//! critical-section cell for the `(ok, total)` counters.

#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements
)]

// =============================================================================
// Modules
// =============================================================================

pub mod buffer;
pub mod config;
pub mod constants;
pub mod delay;
pub mod dma;
pub mod error;
pub mod handler;
pub mod lfsr;
pub mod peripheral;
pub mod region;
pub mod register;
pub mod session;
pub mod sync;

// Internal implementation details (pub(crate) only)
mod internal;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use buffer::{DmaBuffer, FpgaMemBuffer, UDmaBuf};
pub use config::{HardwareMap, SessionConfig};
pub use delay::StdDelay;
pub use dma::{DescriptorRingEntry, DmaEngineController, EngineState, ScatterGatherRing};
pub use error::{
    ConfigError, ConfigResult, DmaError, DmaResult, Error, IoError, IoResult, ResourceError,
    Result,
};
pub use handler::{
    DataHandler, HandlerHandle, HandlerReport, Termination, TransferTarget, WaitStatus,
};
pub use lfsr::{Lfsr, LfsrChecker, PacketCheck};
pub use peripheral::{GpioStatus, TrafficGenerator};
pub use region::PhysicalRegion;
pub use register::{
    DmaMode, RegisterFactory, RegisterInterface, RegisterTarget, TransportKind, UioRegisters,
    XdmaRegisters,
};
pub use session::{DmaSession, RunSummary, SessionParts};
pub use sync::{Counters, StopToken};
