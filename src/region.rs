//! Physical address ranges.

/// One contiguous, DMA-capable physical address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhysicalRegion {
    /// Physical (bus) start address
    pub addr: u64,
    /// Size in bytes
    pub size: usize,
}

impl PhysicalRegion {
    /// Create a region from its start address and size
    #[must_use]
    pub const fn new(addr: u64, size: usize) -> Self {
        Self { addr, size }
    }

    /// First address past the end of the region, `None` if it would wrap
    #[inline(always)]
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.addr.checked_add(self.size as u64)
    }

    /// True if `other` lies completely inside this region
    ///
    /// A region whose end does not fit in 64 bits contains nothing and is
    /// contained by nothing.
    #[must_use]
    pub const fn contains(&self, other: &PhysicalRegion) -> bool {
        let (Some(end), Some(other_end)) = (self.end(), other.end()) else {
            return false;
        };
        other.addr >= self.addr && other_end <= end
    }
}

impl core::fmt::Display for PhysicalRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}+{:#x}", self.addr, self.size)
    }
}
