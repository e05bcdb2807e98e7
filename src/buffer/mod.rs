//! DMA-coherent host buffers
//!
//! The data path writes into a buffer whose physical address is stable and
//! visible to the FPGA. Software reads it back through [`DmaBuffer::copy_out`],
//! which translates physical addresses into the process view.
//!
//! - [`UDmaBuf`]: kernel-reserved `u-dma-buf` buffer, mapped into the process
//! - [`FpgaMemBuffer`]: FPGA-side memory read through the XDMA `c2h0` channel

mod fpga_mem;
mod udmabuf;

pub use fpga_mem::FpgaMemBuffer;
pub use udmabuf::UDmaBuf;

use crate::error::{DmaError, DmaResult, Result};
use crate::region::PhysicalRegion;

/// A DMA target buffer with physical-address read-out
pub trait DmaBuffer: Send + Sync {
    /// Physical base address as seen by the DMA engine
    fn phys_addr(&self) -> u64;

    /// Buffer size in bytes
    fn size(&self) -> usize;

    /// Append exactly `region.size` bytes, read at physical `region.addr`,
    /// to `out`.
    ///
    /// `out` is left untouched when the region is not inside the buffer.
    fn copy_out(&self, region: PhysicalRegion, out: &mut Vec<u8>) -> Result<()>;

    /// The whole buffer as a physical region
    fn phys_region(&self) -> PhysicalRegion {
        PhysicalRegion::new(self.phys_addr(), self.size())
    }
}

/// Translate `region` to a byte offset inside `buffer`.
pub(crate) fn local_offset(buffer: PhysicalRegion, region: PhysicalRegion) -> DmaResult<usize> {
    if !buffer.contains(&region) {
        return Err(DmaError::RegionOutOfBounds {
            addr: region.addr,
            size: region.size,
        });
    }
    Ok((region.addr - buffer.addr) as usize)
}
