//! AXI DMA scatter-gather descriptor layout.
//!
//! Descriptors live in descriptor memory (typically an AXI BRAM) at a
//! 64-byte stride. Only the S2MM (stream to memory) view is used here.

use crate::register::RegisterInterface;

// =============================================================================
// Word Offsets
// =============================================================================

/// Descriptor word offsets relative to the descriptor start
pub mod offset {
    /// Next descriptor pointer, lower 32 bits
    pub const NXTDESC: usize = 0x00;
    /// Next descriptor pointer, upper 32 bits
    pub const NXTDESC_MSB: usize = 0x04;
    /// Buffer address, lower 32 bits
    pub const BUFFER_ADDRESS: usize = 0x08;
    /// Buffer address, upper 32 bits
    pub const BUFFER_ADDRESS_MSB: usize = 0x0C;
    /// Control word (buffer length)
    pub const CONTROL: usize = 0x18;
    /// Status word (written back by the engine)
    pub const STATUS: usize = 0x1C;
}

// =============================================================================
// Bit Fields
// =============================================================================

/// Control word bit fields
pub mod control {
    /// Buffer length in bytes (26 bits)
    pub const BUFFER_LEN_MASK: u32 = 0x03FF_FFFF;
}

/// Status word bit fields
pub mod status {
    /// Transferred length in bytes (26 bits)
    pub const TRANSFERRED_MASK: u32 = 0x03FF_FFFF;
    /// End of frame received in this buffer
    pub const RXEOF: u32 = 1 << 26;
    /// Start of frame received in this buffer
    pub const RXSOF: u32 = 1 << 27;
    /// Internal error
    pub const DMA_INT_ERR: u32 = 1 << 28;
    /// Slave error
    pub const DMA_SLV_ERR: u32 = 1 << 29;
    /// Decode error
    pub const DMA_DEC_ERR: u32 = 1 << 30;
    /// Transfer complete
    pub const CMPLT: u32 = 1 << 31;

    /// All error bits
    pub const ALL_ERRORS: u32 = DMA_INT_ERR | DMA_SLV_ERR | DMA_DEC_ERR;
}

// =============================================================================
// Descriptor View
// =============================================================================

/// One descriptor inside a descriptor memory window
pub struct SgDescriptor<'a> {
    mem: &'a dyn RegisterInterface,
    base: usize,
}

impl<'a> SgDescriptor<'a> {
    /// View the descriptor starting at byte `base` of `mem`
    pub fn new(mem: &'a dyn RegisterInterface, base: usize) -> Self {
        Self { mem, base }
    }

    /// Program the descriptor: chain pointer, destination and length.
    /// The status word is cleared last.
    pub fn setup(&self, next: u64, destination: u64, length: usize) {
        self.mem.write_addr64(self.base + offset::NXTDESC, next);
        self.mem
            .write_addr64(self.base + offset::BUFFER_ADDRESS, destination);
        self.mem.write32(
            self.base + offset::CONTROL,
            length as u32 & control::BUFFER_LEN_MASK,
        );
        self.clear_status();
    }

    /// Next descriptor pointer
    pub fn next(&self) -> u64 {
        self.mem.read_addr64(self.base + offset::NXTDESC)
    }

    /// Destination buffer address
    pub fn buffer_address(&self) -> u64 {
        self.mem.read_addr64(self.base + offset::BUFFER_ADDRESS)
    }

    /// Programmed buffer length
    pub fn buffer_len(&self) -> usize {
        (self.mem.read32(self.base + offset::CONTROL) & control::BUFFER_LEN_MASK) as usize
    }

    /// Raw status word
    #[inline(always)]
    pub fn status(&self) -> u32 {
        self.mem.read32(self.base + offset::STATUS)
    }

    /// Transferred length if the engine marked the descriptor complete
    pub fn completed_len(&self) -> Option<usize> {
        let word = self.status();
        (word & status::CMPLT != 0).then_some((word & status::TRANSFERRED_MASK) as usize)
    }

    /// Clear the status word so the slot can signal completion again
    #[inline(always)]
    pub fn clear_status(&self) {
        self.mem.write32(self.base + offset::STATUS, 0);
    }
}
