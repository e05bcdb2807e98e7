//! Traffic generator pattern validation
//!
//! The AXI Traffic Generator fills each 16-byte stream beat with one 16-bit
//! LFSR value repeated eight times, stepping the LFSR once per beat. The
//! sequence runs on across packet boundaries.

use crate::constants::{LFSR_BYTES_PER_BEAT, LFSR_WORDS_PER_BEAT};

/// Per-packet validation used by the data handler
pub trait PacketCheck: Send {
    /// True if `packet` matches the expected pattern
    fn check(&mut self, packet: &[u8]) -> bool;
}

/// 16-bit LFSR with taps 0, 1, 3 and 12 (XNOR feedback)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lfsr {
    state: u16,
}

impl Lfsr {
    /// Start from `seed`
    #[must_use]
    pub const fn new(seed: u16) -> Self {
        Self { state: seed }
    }

    /// Current value
    #[inline(always)]
    #[must_use]
    pub const fn value(&self) -> u16 {
        self.state
    }

    /// Step once and return the new value
    #[inline]
    pub fn advance(&mut self) -> u16 {
        let s = self.state;
        let bit = (1 ^ s ^ (s >> 1) ^ (s >> 3) ^ (s >> 12)) & 1;
        self.state = (bit << 15) | (s >> 1);
        self.state
    }
}

/// Checks packets against the LFSR sequence, seeded from the first word
/// ever seen.
///
/// A mismatching beat still steps the LFSR, so one corrupted packet does
/// not throw off the packets after it.
#[derive(Debug, Clone, Default)]
pub struct LfsrChecker {
    lfsr: Option<Lfsr>,
}

impl LfsrChecker {
    /// Checker that seeds itself from the first received word
    #[must_use]
    pub const fn new() -> Self {
        Self { lfsr: None }
    }

    /// Checker expecting `seed` as the first beat value
    #[must_use]
    pub const fn with_seed(seed: u16) -> Self {
        Self {
            lfsr: Some(Lfsr::new(seed)),
        }
    }

    /// Render `beats` beats of the sequence starting at `lfsr`
    pub fn generate(lfsr: &mut Lfsr, beats: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(beats * LFSR_BYTES_PER_BEAT);
        for _ in 0..beats {
            let word = lfsr.value().to_le_bytes();
            for _ in 0..LFSR_WORDS_PER_BEAT {
                out.extend_from_slice(&word);
            }
            lfsr.advance();
        }
        out
    }
}

impl PacketCheck for LfsrChecker {
    fn check(&mut self, packet: &[u8]) -> bool {
        if packet.is_empty() || packet.len() % LFSR_BYTES_PER_BEAT != 0 {
            return false;
        }
        let lfsr = self
            .lfsr
            .get_or_insert_with(|| Lfsr::new(u16::from_le_bytes([packet[0], packet[1]])));

        let mut ok = true;
        for beat in packet.chunks_exact(LFSR_BYTES_PER_BEAT) {
            let expected = lfsr.value();
            ok &= beat
                .chunks_exact(2)
                .all(|w| u16::from_le_bytes([w[0], w[1]]) == expected);
            lfsr.advance();
        }
        ok
    }
}
