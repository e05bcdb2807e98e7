//! Stimulus and status peripherals next to the DMA engine
//!
//! - [`TrafficGenerator`]: AXI Traffic Generator in streaming mode, the
//!   source of the LFSR packets the data handler validates
//! - [`GpioStatus`]: status inputs, sampled once before any DMA activity

use std::sync::Arc;

use log::debug;

use crate::constants::{LFSR_BYTES_PER_BEAT, MAX_BEATS_PER_PACKET};
use crate::error::{ConfigError, ConfigResult};
use crate::register::{RegisterInterface, reg_bit_ops, reg_ro, reg_rw};

// =============================================================================
// Traffic Generator
// =============================================================================

/// Streaming-mode register offsets of the AXI Traffic Generator
pub mod tg_offset {
    /// Streaming control
    pub const ST_CTRL: usize = 0x30;
    /// Streaming configuration (inter-packet delay)
    pub const ST_CONFIG: usize = 0x34;
    /// Transfer length and count
    pub const TR_LEN: usize = 0x38;
    /// Extended transfer length (upper length bits)
    pub const EXT_TR_LEN: usize = 0x50;
}

/// ST_CTRL bit fields
pub mod st_ctrl {
    /// Streaming enable
    pub const STREN: u32 = 1 << 0;
    /// All transfers done
    pub const DONE: u32 = 1 << 1;
}

/// Bit fields of the configuration and length registers
pub mod tr_len {
    /// Inter-packet delay shift in ST_CONFIG
    pub const PDLY_SHIFT: u32 = 16;
    /// Transfer count shift in TR_LEN
    pub const TCNT_SHIFT: u32 = 16;
    /// Lower 16 bits of (beats - 1) in TR_LEN
    pub const TLEN_MASK: u32 = 0xFFFF;
    /// Upper 8 bits of (beats - 1) in ExtTR_LEN
    pub const EXT_TLEN_MASK: u32 = 0xFF;
}

/// AXI Traffic Generator, streaming mode
pub struct TrafficGenerator {
    regs: Arc<dyn RegisterInterface>,
}

impl TrafficGenerator {
    /// Wrap a traffic generator register window
    pub fn new(regs: Arc<dyn RegisterInterface>) -> Self {
        Self { regs }
    }

    reg_ro!(control, tg_offset::ST_CTRL, "streaming control register");
    reg_rw!(config, set_config, tg_offset::ST_CONFIG, "streaming configuration register");
    reg_rw!(transfer_len, set_transfer_len, tg_offset::TR_LEN, "transfer length register");
    reg_rw!(
        ext_transfer_len,
        set_ext_transfer_len,
        tg_offset::EXT_TR_LEN,
        "extended transfer length register"
    );
    reg_bit_ops!(
        enable_streaming,
        disable_streaming,
        tg_offset::ST_CTRL,
        st_ctrl::STREN,
        "streaming",
        "Enable",
        "Disable"
    );

    /// Emit `count` packets of `length` bytes, `pause` clock cycles apart.
    ///
    /// `length` must be a non-zero multiple of the 16-byte beat, at most
    /// 2^24 beats.
    pub fn start(&self, count: u16, length: usize, pause: u16) -> ConfigResult<()> {
        if length == 0 || length % LFSR_BYTES_PER_BEAT != 0 {
            return Err(ConfigError::InvalidConfig(
                "packet length must be a multiple of 16 bytes",
            ));
        }
        let beats = length / LFSR_BYTES_PER_BEAT;
        if beats > MAX_BEATS_PER_PACKET {
            return Err(ConfigError::InvalidConfig("packet length too large"));
        }
        let tlen = (beats - 1) as u32;

        debug!("traffic gen: {count} packets of {beats} beats, pause {pause}");
        self.set_config(u32::from(pause) << tr_len::PDLY_SHIFT);
        self.set_transfer_len(
            (u32::from(count) << tr_len::TCNT_SHIFT) | (tlen & tr_len::TLEN_MASK),
        );
        self.set_ext_transfer_len((tlen >> 16) & tr_len::EXT_TLEN_MASK);
        self.enable_streaming();
        Ok(())
    }

    /// Disable streaming. Safe to call repeatedly.
    pub fn stop(&self) {
        self.disable_streaming();
    }

    /// True once all requested packets were emitted
    pub fn is_done(&self) -> bool {
        self.control() & st_ctrl::DONE != 0
    }

    /// True while streaming is enabled
    pub fn is_streaming(&self) -> bool {
        self.control() & st_ctrl::STREN != 0
    }
}

// =============================================================================
// GPIO Status
// =============================================================================

/// AXI GPIO channel 1 data register
const GPIO_DATA: usize = 0x0;

/// Status inputs wired to an AXI GPIO
pub struct GpioStatus {
    regs: Arc<dyn RegisterInterface>,
}

impl GpioStatus {
    /// Bit 0: DDR4 init calibration complete
    pub const DDR4_INIT_CALIB_COMPLETE: u32 = 1 << 0;

    /// Wrap a GPIO register window
    pub fn new(regs: Arc<dyn RegisterInterface>) -> Self {
        Self { regs }
    }

    reg_ro!(data, GPIO_DATA, "GPIO data register");

    /// True when the memory controller finished calibration
    pub fn is_ddr4_init_calib_complete(&self) -> bool {
        self.data() & Self::DDR4_INIT_CALIB_COMPLETE != 0
    }
}
