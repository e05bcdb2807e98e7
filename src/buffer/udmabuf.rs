//! Kernel-reserved `u-dma-buf` buffers.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use super::{DmaBuffer, local_offset};
use crate::constants::{DEV_ROOT, UDMABUF_SYSFS_ROOT};
use crate::error::Result;
use crate::internal::mmap::MappedRegion;
use crate::internal::sysfs::{open_device, read_u64};
use crate::region::PhysicalRegion;

/// A `u-dma-buf` buffer identified by its index
///
/// Size and physical address are read from
/// `/sys/class/u-dma-buf/udmabuf<N>/{size,phys_addr}`, the data is mapped
/// from `/dev/udmabuf<N>` opened with `O_SYNC`.
#[derive(Debug)]
pub struct UDmaBuf {
    map: MappedRegion,
    _file: File,
    phys: PhysicalRegion,
}

impl UDmaBuf {
    /// Open buffer `index` below the standard roots.
    pub fn open(index: u32) -> Result<Self> {
        Self::open_in(Path::new(UDMABUF_SYSFS_ROOT), Path::new(DEV_ROOT), index)
    }

    /// Open buffer `index`, reading attributes below `sys_root` and mapping
    /// the node in `dev_root`.
    pub fn open_in(sys_root: &Path, dev_root: &Path, index: u32) -> Result<Self> {
        let name = format!("udmabuf{index}");
        let attrs: PathBuf = sys_root.join(&name);
        let size = read_u64(&attrs.join("size"))? as usize;
        let addr = read_u64(&attrs.join("phys_addr"))?;
        debug!("UDmaBuf: size      = {size}");
        debug!("UDmaBuf: phys addr = {addr:#x}");

        let path = dev_root.join(&name);
        let file = open_device(&path, true)?;
        let map = MappedRegion::map(&file, &path, 0, size)?;
        trace!("UDmaBuf: mapped {} ({size} bytes)", path.display());

        Ok(Self {
            map,
            _file: file,
            phys: PhysicalRegion::new(addr, size),
        })
    }

    /// Write `data` at physical address `addr` (buffer priming and loopback)
    pub fn write_at(&self, addr: u64, data: &[u8]) -> Result<()> {
        let offset = local_offset(self.phys, PhysicalRegion::new(addr, data.len()))?;
        self.map.write_bytes(offset, data);
        Ok(())
    }
}

impl DmaBuffer for UDmaBuf {
    fn phys_addr(&self) -> u64 {
        self.phys.addr
    }

    fn size(&self) -> usize {
        self.phys.size
    }

    fn copy_out(&self, region: PhysicalRegion, out: &mut Vec<u8>) -> Result<()> {
        let offset = local_offset(self.phys, region)?;
        let old_len = out.len();
        out.resize(old_len + region.size, 0);
        self.map.read_bytes(offset, &mut out[old_len..]);
        Ok(())
    }
}
