//! Register windows backed by named UIO devices.

use std::fs::File;
use std::path::Path;

use log::debug;

use super::RegisterInterface;
use crate::constants::{DEV_ROOT, UIO_SYSFS_ROOT};
use crate::error::{ResourceError, Result};
use crate::internal::mmap::MappedRegion;
use crate::internal::sysfs::{open_device, read_attr, read_u64};
use crate::region::PhysicalRegion;

/// Register window of a UIO device, found by its `name` attribute
///
/// Only map 0 of the device is used. Its physical address and size come
/// from `maps/map0/{addr,size}`.
#[derive(Debug)]
pub struct UioRegisters {
    map: MappedRegion,
    _file: File,
    region: PhysicalRegion,
    device: String,
}

impl UioRegisters {
    /// Open the UIO device called `name` below the standard roots.
    pub fn open(name: &str) -> Result<Self> {
        Self::open_in(Path::new(UIO_SYSFS_ROOT), Path::new(DEV_ROOT), name)
    }

    /// Open the UIO device called `name`, looking it up in `sys_root` and
    /// opening its node in `dev_root`.
    pub fn open_in(sys_root: &Path, dev_root: &Path, name: &str) -> Result<Self> {
        let device = find_device(sys_root, name)?;
        let map_dir = sys_root.join(&device).join("maps").join("map0");
        let addr = read_u64(&map_dir.join("addr"))?;
        let size = read_u64(&map_dir.join("size"))? as usize;
        debug!("UIO {name}: {device}, region {}", PhysicalRegion::new(addr, size));

        let path = dev_root.join(&device);
        let file = open_device(&path, true)?;
        let map = MappedRegion::map(&file, &path, 0, size)?;

        Ok(Self {
            map,
            _file: file,
            region: PhysicalRegion::new(addr, size),
            device,
        })
    }

    /// Kernel device name (`uioN`)
    pub fn device(&self) -> &str {
        &self.device
    }
}

/// Find the `uioN` entry whose `name` attribute equals `name`.
fn find_device(sys_root: &Path, name: &str) -> core::result::Result<String, ResourceError> {
    let entries = std::fs::read_dir(sys_root).map_err(|_| ResourceError::NotFound {
        what: sys_root.display().to_string(),
    })?;

    let mut devices: Vec<String> = entries
        .filter_map(core::result::Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|dev| dev.starts_with("uio"))
        .collect();
    devices.sort();

    devices
        .into_iter()
        .find(|dev| {
            read_attr(&sys_root.join(dev).join("name"))
                .is_ok_and(|found| found.trim() == name)
        })
        .ok_or_else(|| ResourceError::NotFound {
            what: format!("UIO device named {name:?}"),
        })
}

impl RegisterInterface for UioRegisters {
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
