//! Cyclic scatter-gather descriptor ring.

use std::sync::Arc;

use log::{debug, trace};

use super::descriptor::SgDescriptor;
use crate::constants::{MAX_DESCRIPTOR_BUFFER_LEN, SG_DESCRIPTOR_LEN};
use crate::error::{ConfigError, DmaError, Result};
use crate::register::RegisterInterface;

/// One ring slot as written to descriptor memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRingEntry {
    /// Physical address of the descriptor itself
    pub address: u64,
    /// Physical address the engine writes this slot's data to
    pub destination: u64,
    /// Destination buffer length in bytes
    pub length: usize,
    /// Physical address of the following descriptor
    pub next: u64,
}

/// A closed ring of S2MM descriptors in descriptor memory
///
/// Entry `i` targets `dst_base + i * entry_len`; the last entry points back
/// at the first, so the engine in cyclic mode runs through the ring
/// indefinitely. A ring only exists fully written.
pub struct ScatterGatherRing {
    mem: Arc<dyn RegisterInterface>,
    entries: Vec<DescriptorRingEntry>,
}

impl ScatterGatherRing {
    /// Write `count` descriptors at the start of `mem`.
    pub fn write_cyclic(
        mem: Arc<dyn RegisterInterface>,
        dst_base: u64,
        count: usize,
        entry_len: usize,
    ) -> Result<Self> {
        if count == 0 {
            return Err(ConfigError::InvalidConfig("ring needs at least one descriptor").into());
        }
        if entry_len == 0 || entry_len > MAX_DESCRIPTOR_BUFFER_LEN {
            return Err(ConfigError::InvalidConfig("ring entry length out of range").into());
        }
        let window = mem.region();
        if count * SG_DESCRIPTOR_LEN > window.size {
            return Err(DmaError::RingTooLarge {
                entries: count,
                capacity: window.size,
            }
            .into());
        }

        let desc_addr = |i: usize| window.addr + (i * SG_DESCRIPTOR_LEN) as u64;
        let entries: Vec<DescriptorRingEntry> = (0..count)
            .map(|i| DescriptorRingEntry {
                address: desc_addr(i),
                destination: dst_base + (i * entry_len) as u64,
                length: entry_len,
                next: desc_addr((i + 1) % count),
            })
            .collect();

        for (i, entry) in entries.iter().enumerate() {
            trace!(
                "desc[{i:2}] @ {:#x}: dst={:#x} len={:#x} next={:#x}",
                entry.address, entry.destination, entry.length, entry.next
            );
            SgDescriptor::new(mem.as_ref(), i * SG_DESCRIPTOR_LEN).setup(
                entry.next,
                entry.destination,
                entry.length,
            );
        }
        debug!(
            "SG ring: {count} descriptors at {:#x}, {entry_len} bytes each from {dst_base:#x}",
            window.addr
        );

        Ok(Self { mem, entries })
    }

    /// Physical address of the first descriptor (engine start pointer)
    #[inline(always)]
    pub fn first_desc_addr(&self) -> u64 {
        self.entries[0].address
    }

    /// Number of descriptors
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a ring has at least one descriptor
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry `index`, wrapping around the ring
    pub fn entry(&self, index: usize) -> DescriptorRingEntry {
        self.entries[index % self.entries.len()]
    }

    /// All entries in ring order
    pub fn entries(&self) -> &[DescriptorRingEntry] {
        &self.entries
    }

    /// Transferred length of slot `index`, if the engine completed it
    pub fn completed(&self, index: usize) -> Option<usize> {
        self.descriptor(index).completed_len()
    }

    /// Hand slot `index` back to the engine by clearing its status
    pub fn release(&self, index: usize) {
        self.descriptor(index).clear_status();
    }

    fn descriptor(&self, index: usize) -> SgDescriptor<'_> {
        SgDescriptor::new(
            self.mem.as_ref(),
            (index % self.entries.len()) * SG_DESCRIPTOR_LEN,
        )
    }
}

impl core::fmt::Debug for ScatterGatherRing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScatterGatherRing")
            .field("first_desc", &format_args!("{:#x}", self.first_desc_addr()))
            .field("len", &self.len())
            .finish()
    }
}

/// Consumer position in a ring, wrapping at the ring length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    current: usize,
    len: usize,
}

impl RingCursor {
    /// Cursor at slot 0 of a ring with `len` slots
    #[must_use]
    pub const fn new(len: usize) -> Self {
        Self { current: 0, len }
    }

    /// Current slot
    #[inline(always)]
    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// Advance by one slot, wrapping around
    #[inline(always)]
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.len;
    }

    /// Back to slot 0
    #[inline(always)]
    pub fn reset(&mut self) {
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::PhysicalRegion;
    use crate::testing::MockRegisters;

    const BRAM: u64 = 0xA000_0000;

    fn bram(size: usize) -> Arc<MockRegisters> {
        Arc::new(MockRegisters::new(size).with_region(PhysicalRegion::new(BRAM, size)))
    }

    #[test]
    fn ring_is_closed() {
        let mem = bram(0x2000);
        let ring = ScatterGatherRing::write_cyclic(mem.clone(), 0x7F00_0000, 32, 0x4000).unwrap();

        assert_eq!(ring.len(), 32);
        assert_eq!(ring.first_desc_addr(), BRAM);
        let entries = ring.entries();
        assert_eq!(entries[31].next, entries[0].address);
        for (i, pair) in entries.windows(2).enumerate() {
            assert_eq!(pair[0].next, pair[1].address, "entry {i}");
        }
    }

    #[test]
    fn destinations_are_contiguous() {
        let mem = bram(0x800);
        let ring = ScatterGatherRing::write_cyclic(mem, 0x7F00_0000, 4, 0x1000).unwrap();

        for i in 0..4 {
            assert_eq!(ring.entry(i).destination, 0x7F00_0000 + i as u64 * 0x1000);
            assert_eq!(ring.entry(i).length, 0x1000);
        }
        assert_eq!(ring.entry(5), ring.entry(1));
    }

    #[test]
    fn descriptors_are_in_memory() {
        let mem = bram(0x800);
        let ring = ScatterGatherRing::write_cyclic(mem.clone(), 0x7F00_0000, 3, 0x100).unwrap();

        for (i, entry) in ring.entries().iter().enumerate() {
            let desc = SgDescriptor::new(mem.as_ref(), i * SG_DESCRIPTOR_LEN);
            assert_eq!(desc.next(), entry.next);
            assert_eq!(desc.buffer_address(), entry.destination);
            assert_eq!(desc.buffer_len(), 0x100);
            assert_eq!(desc.status(), 0);
        }
    }

    #[test]
    fn single_entry_ring_points_to_itself() {
        let ring = ScatterGatherRing::write_cyclic(bram(0x40), 0, 1, 64).unwrap();
        assert_eq!(ring.entry(0).next, ring.entry(0).address);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(ScatterGatherRing::write_cyclic(bram(0x800), 0, 0, 64).is_err());
        assert!(ScatterGatherRing::write_cyclic(bram(0x800), 0, 4, 0).is_err());
        assert!(
            ScatterGatherRing::write_cyclic(bram(0x800), 0, 4, MAX_DESCRIPTOR_BUFFER_LEN + 1)
                .is_err()
        );

        let err = ScatterGatherRing::write_cyclic(bram(0x100), 0, 8, 64).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Dma(DmaError::RingTooLarge {
                entries: 8,
                capacity: 0x100
            })
        ));
    }

    #[test]
    fn release_clears_completion() {
        let mem = bram(0x100);
        let ring = ScatterGatherRing::write_cyclic(mem.clone(), 0, 2, 64).unwrap();
        mem.write32(SG_DESCRIPTOR_LEN + 0x1C, 0x8000_0040);

        assert_eq!(ring.completed(0), None);
        assert_eq!(ring.completed(1), Some(64));
        ring.release(1);
        assert_eq!(ring.completed(1), None);
    }

    #[test]
    fn cursor_wraps() {
        let mut cursor = RingCursor::new(3);
        cursor.advance();
        cursor.advance();
        assert_eq!(cursor.current_index(), 2);
        cursor.advance();
        assert_eq!(cursor.current_index(), 0);
        cursor.advance();
        cursor.reset();
        assert_eq!(cursor.current_index(), 0);
    }
}
