//! Centralized Constants
//!
//! This module provides a single source of truth for the magic numbers and
//! default settings used throughout the driver.
//!
//! # Organization
//!
//! Constants are grouped by category:
//! - **Ring/buffer sizes**: descriptor count and per-descriptor buffer length
//! - **Timing**: poll intervals and reset timeouts
//! - **Stream format**: traffic generator beat layout
//! - **Linux resources**: sysfs and device node locations
//! - **Session defaults**: packet count, length and pause
//!
//! # Note
//!
//! Register offsets and bit definitions remain in their respective modules
//! (`dma/engine.rs`, `dma/descriptor.rs`, `peripheral.rs`) as they are
//! specific to those hardware blocks.

use std::time::Duration;

// =============================================================================
// Ring and Buffer Sizes
// =============================================================================

/// Default number of descriptors in the cyclic ring
pub const DEFAULT_RING_ENTRIES: usize = 32;

/// Default bytes per ring entry (destination buffer length)
pub const DEFAULT_ENTRY_LEN: usize = 16 * 1024;

/// Scatter-gather descriptor stride in descriptor memory
pub const SG_DESCRIPTOR_LEN: usize = 0x40;

/// Largest buffer length the descriptor control word can express (26 bits)
pub const MAX_DESCRIPTOR_BUFFER_LEN: usize = (1 << 26) - 1;

// =============================================================================
// Timing Constants
// =============================================================================

/// Default handler poll interval and supervisor wait granularity
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Soft reset timeout in microseconds
pub const RESET_TIMEOUT_US: u32 = 10_000;

/// Soft reset poll interval in microseconds
pub const RESET_POLL_INTERVAL_US: u32 = 10;

// =============================================================================
// Stream Format
// =============================================================================

/// Bytes per stream beat emitted by the traffic generator
pub const LFSR_BYTES_PER_BEAT: usize = 16;

/// 16-bit LFSR words per beat (the value is repeated across the beat)
pub const LFSR_WORDS_PER_BEAT: usize = LFSR_BYTES_PER_BEAT / 2;

/// Maximum beats per generator transfer (24-bit length field)
pub const MAX_BEATS_PER_PACKET: usize = 1 << 24;

// =============================================================================
// Linux Resources
// =============================================================================

/// sysfs class directory for UIO devices
pub const UIO_SYSFS_ROOT: &str = "/sys/class/uio";

/// sysfs class directory for u-dma-buf buffers
pub const UDMABUF_SYSFS_ROOT: &str = "/sys/class/u-dma-buf";

/// Directory holding device nodes
pub const DEV_ROOT: &str = "/dev";

/// XDMA character device exposing the AXI-Lite user window
pub const XDMA_USER_NODE: &str = "user";

/// XDMA card-to-host channel used for FPGA memory reads
pub const XDMA_C2H_NODE: &str = "c2h0";

// =============================================================================
// Session Defaults
// =============================================================================

/// Default number of packets requested from the generator
pub const DEFAULT_PACKET_COUNT: u16 = 1;

/// Default packet length in bytes
pub const DEFAULT_PACKET_LEN: usize = 1024;

/// Default pause between packets in generator clock cycles
pub const DEFAULT_PACKET_PAUSE: u16 = 10;
