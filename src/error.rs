//! Error types for the AXI DMA driver
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ResourceError`]: device nodes, sysfs attributes and mappings
//! - [`ConfigError`]: invalid settings and unmet startup preconditions
//! - [`DmaError`]: engine state, descriptor ring and buffer addressing
//! - [`IoError`]: runtime waits and handle misuse
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by most driver methods.

use std::path::PathBuf;

// =============================================================================
// Resource Errors
// =============================================================================

/// Failures while acquiring hardware resources
///
/// All of these are fatal at construction time: nothing has been armed yet
/// when they are returned.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Expected device node, sysfs attribute or named UIO device is absent
    #[error("resource not found: {what}")]
    NotFound {
        /// Path or device name that was looked up
        what: String,
    },
    /// The resource exists but could not be opened
    #[error("could not open {}", path.display())]
    OpenFailed {
        /// Path of the resource
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// Mapping the resource into the process failed
    #[error("mmap failed for {}", path.display())]
    MapFailed {
        /// Path of the mapped resource
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// A text attribute did not hold a parseable number
    #[error("invalid value {value:?} in {}", path.display())]
    InvalidValue {
        /// Path of the attribute
        path: PathBuf,
        /// Raw text that failed to parse
        value: String,
    },
    /// A positional read from a bus-exposed memory window failed
    #[error("read of {len} bytes at {addr:#x} from {} failed", path.display())]
    ReadFailed {
        /// Path of the device file
        path: PathBuf,
        /// Bus address of the read
        addr: u64,
        /// Number of bytes requested
        len: usize,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// The data handler thread could not be spawned
    #[error("could not spawn data handler thread")]
    Spawn(#[source] std::io::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration and startup precondition errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration parameter
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// XDMA transport selected without a device path
    #[error("XDMA mode needs a device path")]
    MissingDevicePath,
    /// Unknown transport mode name
    #[error("unknown transport mode")]
    UnknownMode,
    /// Memory controller calibration has not completed
    #[error("DDR4 init calibration is not complete")]
    CalibrationIncomplete,
}

// =============================================================================
// DMA Errors
// =============================================================================

/// DMA engine, descriptor ring and buffer addressing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DmaError {
    /// `start` called while the engine is already running
    #[error("DMA engine already running")]
    AlreadyRunning,
    /// Soft reset bit did not self-clear in time
    #[error("DMA soft reset timed out")]
    ResetTimeout,
    /// Engine still reports halted after the run bit was set
    #[error("DMA engine did not leave halted state (DMASR {status:#010x})")]
    StartNotAcknowledged {
        /// Raw status register value
        status: u32,
    },
    /// Engine reported an internal, slave or decode error
    #[error("DMA engine fault (DMASR {status:#010x})")]
    EngineFault {
        /// Raw status register value
        status: u32,
    },
    /// Descriptor ring does not fit into descriptor memory
    #[error("descriptor ring of {entries} entries does not fit in {capacity} bytes")]
    RingTooLarge {
        /// Requested number of descriptors
        entries: usize,
        /// Size of the descriptor memory window
        capacity: usize,
    },
    /// Requested region lies outside the buffer
    #[error("region {addr:#x}+{size:#x} is outside the DMA buffer")]
    RegionOutOfBounds {
        /// Physical start address of the region
        addr: u64,
        /// Size of the region
        size: usize,
    },
}

// =============================================================================
// I/O Errors
// =============================================================================

/// Runtime wait and handle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    /// Operation timed out
    #[error("operation timed out")]
    Timeout,
    /// Invalid state for operation (e.g. result already taken)
    #[error("invalid state for operation")]
    InvalidState,
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// Match on the inner domain error for specific handling:
/// ```ignore
/// match result {
///     Err(Error::Resource(ResourceError::NotFound { .. })) => { /* ... */ }
///     Err(Error::Dma(DmaError::AlreadyRunning)) => { /* ... */ }
///     Err(Error::Io(IoError::Timeout)) => { /* ... */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resource acquisition error
    #[error("resource: {0}")]
    Resource(#[from] ResourceError),
    /// Configuration error
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// DMA error
    #[error("dma: {0}")]
    Dma(#[from] DmaError),
    /// I/O error
    #[error("io: {0}")]
    Io(#[from] IoError),
}

impl Error {
    /// True for errors caused by calling an operation in the wrong state or
    /// before a hardware precondition holds.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            Error::Dma(DmaError::AlreadyRunning) | Error::Config(ConfigError::CalibrationIncomplete)
        )
    }
}

/// Result type alias for driver operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for DMA operations
pub type DmaResult<T> = core::result::Result<T, DmaError>;

/// Result type alias for I/O operations
pub type IoResult<T> = core::result::Result<T, IoError>;

// =============================================================================
// Unit Tests
// =============================================================================
