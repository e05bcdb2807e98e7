//! Register windows reached through the XDMA `user` (AXI-Lite) node.

use std::fs::File;
use std::path::Path;

use log::debug;

use super::RegisterInterface;
use crate::constants::XDMA_USER_NODE;
use crate::error::{ConfigError, Result};
use crate::internal::mmap::MappedRegion;
use crate::internal::sysfs::open_device;
use crate::region::PhysicalRegion;

/// Register window at a fixed bus address behind an XDMA PCIe bridge
///
/// The `user` node maps the AXI-Lite address space starting at
/// `link_offset`, so the window lives at file offset
/// `window.addr - link_offset`.
#[derive(Debug)]
pub struct XdmaRegisters {
    map: MappedRegion,
    _file: File,
    region: PhysicalRegion,
}

impl XdmaRegisters {
    /// Map `window` from `<dev_path>/user`.
    pub fn open(dev_path: &Path, window: PhysicalRegion, link_offset: u64) -> Result<Self> {
        let offset = window
            .addr
            .checked_sub(link_offset)
            .ok_or(ConfigError::InvalidConfig("register window below the PCIe link offset"))?;

        let path = dev_path.join(XDMA_USER_NODE);
        debug!("XDMA {}: window {window} at file offset {offset:#x}", path.display());
        let file = open_device(&path, true)?;
        let map = MappedRegion::map(&file, &path, offset, window.size)?;

        Ok(Self {
            map,
            _file: file,
            region: window,
        })
    }
}

impl RegisterInterface for XdmaRegisters {
    #[inline(always)]
    fn read32(&self, offset: usize) -> u32 {
        self.map.read32(offset)
    }

    #[inline(always)]
    fn write32(&self, offset: usize, value: u32) {
        self.map.write32(offset, value);
    }

    fn region(&self) -> PhysicalRegion {
        self.region
    }
}
