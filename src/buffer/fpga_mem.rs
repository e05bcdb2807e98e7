//! FPGA-side memory read through the XDMA card-to-host channel.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use log::debug;

use super::{DmaBuffer, local_offset};
use crate::constants::XDMA_C2H_NODE;
use crate::error::{ResourceError, Result};
use crate::internal::sysfs::open_device;
use crate::region::PhysicalRegion;

/// Memory on the FPGA side of an XDMA bridge
///
/// The DMA engine writes into FPGA memory at `phys_addr`; the host reads it
/// with positional reads on `<dev_path>/c2h0`, whose file offset is the
/// AXI bus address.
#[derive(Debug)]
pub struct FpgaMemBuffer {
    file: File,
    path: PathBuf,
    phys: PhysicalRegion,
}

impl FpgaMemBuffer {
    /// Open the `c2h0` channel below `dev_path` for the memory at
    /// `phys_addr` spanning `size` bytes.
    pub fn open(dev_path: &Path, phys_addr: u64, size: usize) -> Result<Self> {
        let path = dev_path.join(XDMA_C2H_NODE);
        let file = open_device(&path, false)?;
        debug!("FpgaMemBuffer: {} at {phys_addr:#x}, {size} bytes", path.display());

        Ok(Self {
            file,
            path,
            phys: PhysicalRegion::new(phys_addr, size),
        })
    }
}

impl DmaBuffer for FpgaMemBuffer {
    fn phys_addr(&self) -> u64 {
        self.phys.addr
    }

    fn size(&self) -> usize {
        self.phys.size
    }

    fn copy_out(&self, region: PhysicalRegion, out: &mut Vec<u8>) -> Result<()> {
        local_offset(self.phys, region)?;
        let old_len = out.len();
        out.resize(old_len + region.size, 0);
        if let Err(source) = self.file.read_exact_at(&mut out[old_len..], region.addr) {
            out.truncate(old_len);
            return Err(ResourceError::ReadFailed {
                path: self.path.clone(),
                addr: region.addr,
                len: region.size,
                source,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TempTree;

    #[test]
    fn copy_out_reads_at_bus_address() {
        let tree = TempTree::new();
        let mut mem = vec![0u8; 0x3000];
        mem[0x2000..0x2004].copy_from_slice(&[5, 6, 7, 8]);
        tree.file("xdma/c2h0", &mem);

        let buf = FpgaMemBuffer::open(&tree.path("xdma"), 0x1000, 0x2000).unwrap();
        let mut out = Vec::new();
        buf.copy_out(PhysicalRegion::new(0x2000, 4), &mut out).unwrap();
        assert_eq!(out, [5, 6, 7, 8]);
    }

    #[test]
    fn short_read_restores_output() {
        let tree = TempTree::new();
        tree.file("xdma/c2h0", &[0u8; 0x100]);

        // The declared window is larger than what the node can deliver
        let buf = FpgaMemBuffer::open(&tree.path("xdma"), 0, 0x1000).unwrap();
        let mut out = vec![42];
        let err = buf.copy_out(PhysicalRegion::new(0x80, 0x100), &mut out).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Resource(ResourceError::ReadFailed { .. })
        ));
        assert_eq!(out, [42]);
    }

    #[test]
    fn missing_channel_is_not_found() {
        let tree = TempTree::new();
        let err = FpgaMemBuffer::open(&tree.path("xdma"), 0, 0x1000).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Resource(ResourceError::NotFound { .. })
        ));
    }
}
