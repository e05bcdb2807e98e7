//! Register window access
//!
//! Every hardware block (AXI DMA, descriptor BRAM, traffic generator, GPIO)
//! is reached through a [`RegisterInterface`]: a window of 32-bit registers
//! with a known physical placement. Two transports implement it:
//!
//! - [`UioRegisters`]: a UIO device discovered by name under `/sys/class/uio`
//! - [`XdmaRegisters`]: an offset window into the XDMA `user` device
//!
//! The transport is picked once by [`RegisterFactory`]; everything above it
//! works with `Arc<dyn RegisterInterface>`.
//!
//! There is no internal locking. Callers must not issue overlapping writes
//! to the same register from several threads.

mod uio;
mod xdma;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

pub use uio::UioRegisters;
pub use xdma::XdmaRegisters;

use crate::constants::{DEV_ROOT, UIO_SYSFS_ROOT};
use crate::error::{ConfigError, ConfigResult, Result};
use crate::region::PhysicalRegion;

// =============================================================================
// Register Interface Trait
// =============================================================================

/// Raw 32-bit access to a hardware register window
///
/// Offsets are byte offsets from the start of the window and must be
/// 4-byte aligned.
pub trait RegisterInterface: Send + Sync {
    /// Read the register at `offset`
    fn read32(&self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`
    fn write32(&self, offset: usize, value: u32);

    /// Physical placement of the window as seen from the bus
    fn region(&self) -> PhysicalRegion;

    /// Read-modify-write a register
    #[inline(always)]
    fn modify32(&self, offset: usize, f: &dyn Fn(u32) -> u32) {
        let value = self.read32(offset);
        self.write32(offset, f(value));
    }

    /// Set bits in a register (read-modify-write)
    #[inline(always)]
    fn set_bits(&self, offset: usize, bits: u32) {
        self.modify32(offset, &|v| v | bits);
    }

    /// Clear bits in a register (read-modify-write)
    #[inline(always)]
    fn clear_bits(&self, offset: usize, bits: u32) {
        self.modify32(offset, &|v| v & !bits);
    }

    /// Write a 64-bit address as LSB/MSB register pair
    #[inline(always)]
    fn write_addr64(&self, offset: usize, addr: u64) {
        self.write32(offset, addr as u32);
        self.write32(offset + 4, (addr >> 32) as u32);
    }

    /// Read a 64-bit address from an LSB/MSB register pair
    #[inline(always)]
    fn read_addr64(&self, offset: usize) -> u64 {
        u64::from(self.read32(offset)) | (u64::from(self.read32(offset + 4)) << 32)
    }
}

// =============================================================================
// Transport Selection
// =============================================================================

/// Transport family, as named on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Named in-kernel UIO devices
    Uio,
    /// XDMA PCIe bridge
    Xdma,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uio" => Ok(TransportKind::Uio),
            "xdma" => Ok(TransportKind::Xdma),
            _ => Err(ConfigError::UnknownMode),
        }
    }
}

/// How registers and buffers are reached
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DmaMode {
    /// UIO devices discovered by name, u-dma-buf host buffer
    #[default]
    Uio,
    /// XDMA device nodes below `dev_path`, FPGA memory buffer
    Xdma {
        /// Directory holding the XDMA nodes (e.g. `/dev/xdma/slot4`)
        dev_path: PathBuf,
    },
}

impl DmaMode {
    /// Build a mode from its kind and an optional device path.
    ///
    /// XDMA needs a device path; UIO ignores it.
    pub fn new(kind: TransportKind, dev_path: Option<PathBuf>) -> ConfigResult<Self> {
        match (kind, dev_path) {
            (TransportKind::Uio, _) => Ok(DmaMode::Uio),
            (TransportKind::Xdma, Some(dev_path)) if !dev_path.as_os_str().is_empty() => {
                Ok(DmaMode::Xdma { dev_path })
            }
            (TransportKind::Xdma, _) => Err(ConfigError::MissingDevicePath),
        }
    }

    /// Transport family of this mode
    pub fn kind(&self) -> TransportKind {
        match self {
            DmaMode::Uio => TransportKind::Uio,
            DmaMode::Xdma { .. } => TransportKind::Xdma,
        }
    }
}

/// One register block: its UIO name and its XDMA window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTarget {
    /// UIO device name (contents of `/sys/class/uio/uioN/name`)
    pub uio_name: String,
    /// Bus window used through the XDMA `user` node
    pub window: PhysicalRegion,
}

impl RegisterTarget {
    /// Create a target description
    pub fn new(uio_name: impl Into<String>, window: PhysicalRegion) -> Self {
        Self {
            uio_name: uio_name.into(),
            window,
        }
    }
}

/// Creates register windows for one transport mode
#[derive(Debug, Clone)]
pub struct RegisterFactory {
    mode: DmaMode,
    link_offset: u64,
    sys_root: PathBuf,
    dev_root: PathBuf,
}

impl RegisterFactory {
    /// Factory for `mode`; `link_offset` is the bus address the XDMA
    /// `user` node starts at (ignored for UIO).
    pub fn new(mode: DmaMode, link_offset: u64) -> Self {
        Self {
            mode,
            link_offset,
            sys_root: PathBuf::from(UIO_SYSFS_ROOT),
            dev_root: PathBuf::from(DEV_ROOT),
        }
    }

    /// Look for UIO devices below other sysfs/dev roots
    #[must_use]
    pub fn with_uio_roots(
        mut self,
        sys_root: impl AsRef<Path>,
        dev_root: impl AsRef<Path>,
    ) -> Self {
        self.sys_root = sys_root.as_ref().to_path_buf();
        self.dev_root = dev_root.as_ref().to_path_buf();
        self
    }

    /// Selected mode
    pub fn mode(&self) -> &DmaMode {
        &self.mode
    }

    /// Open the register window for `target`
    pub fn create(&self, target: &RegisterTarget) -> Result<Arc<dyn RegisterInterface>> {
        let regs: Arc<dyn RegisterInterface> = match &self.mode {
            DmaMode::Uio => Arc::new(UioRegisters::open_in(
                &self.sys_root,
                &self.dev_root,
                &target.uio_name,
            )?),
            DmaMode::Xdma { dev_path } => Arc::new(XdmaRegisters::open(
                dev_path,
                target.window,
                self.link_offset,
            )?),
        };
        Ok(regs)
    }
}

// =============================================================================
// Register Access Macros
// =============================================================================

/// Generate read/write accessor methods for a register of `self.regs`.
///
/// # Example
/// ```ignore
/// impl<R: RegisterInterface + ?Sized> AxiDmaRegs<R> {
///     reg_rw!(s2mm_control, set_s2mm_control, S2MM_DMACR, "S2MM control register");
/// }
/// ```
macro_rules! reg_rw {
    ($read_fn:ident, $write_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Read ", $doc)]
        #[inline(always)]
        pub fn $read_fn(&self) -> u32 {
            self.regs.read32($offset)
        }

        #[doc = concat!("Write ", $doc)]
        #[inline(always)]
        pub fn $write_fn(&self, value: u32) {
            self.regs.write32($offset, value);
        }
    };
}

/// Generate a read-only accessor method for a register of `self.regs`.
macro_rules! reg_ro {
    ($read_fn:ident, $offset:expr, $doc:expr) => {
        #[doc = concat!("Read ", $doc)]
        #[inline(always)]
        pub fn $read_fn(&self) -> u32 {
            self.regs.read32($offset)
        }
    };
}

/// Generate set/clear bit operation methods for a register of `self.regs`.
macro_rules! reg_bit_ops {
    ($set_fn:ident, $clear_fn:ident, $offset:expr, $bit:expr, $what:expr, $set_verb:expr, $clear_verb:expr) => {
        #[doc = concat!($set_verb, " ", $what)]
        #[inline(always)]
        pub fn $set_fn(&self) {
            self.regs.set_bits($offset, $bit);
        }

        #[doc = concat!($clear_verb, " ", $what)]
        #[inline(always)]
        pub fn $clear_fn(&self) {
            self.regs.clear_bits($offset, $bit);
        }
    };
}

// Export macros for use in sibling modules
pub(crate) use reg_bit_ops;
pub(crate) use reg_ro;
pub(crate) use reg_rw;
