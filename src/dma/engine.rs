//! AXI DMA engine control (S2MM channel, scatter-gather, cyclic).

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::constants::{RESET_POLL_INTERVAL_US, RESET_TIMEOUT_US};
use crate::error::{DmaError, DmaResult};
use crate::register::{RegisterInterface, reg_bit_ops, reg_ro, reg_rw};

// =============================================================================
// Register Map
// =============================================================================

/// S2MM register offsets within the AXI DMA window
pub mod offset {
    /// S2MM control register
    pub const S2MM_DMACR: usize = 0x30;
    /// S2MM status register
    pub const S2MM_DMASR: usize = 0x34;
    /// S2MM current descriptor pointer (LSB, MSB at +4)
    pub const S2MM_CURDESC: usize = 0x38;
    /// S2MM tail descriptor pointer (LSB, MSB at +4)
    pub const S2MM_TAILDESC: usize = 0x40;
}

/// S2MM_DMACR bit fields
pub mod dmacr {
    /// Run/stop
    pub const RS: u32 = 1 << 0;
    /// Soft reset (self-clearing)
    pub const RESET: u32 = 1 << 2;
    /// Keyhole write
    pub const KEYHOLE: u32 = 1 << 3;
    /// Cyclic buffer descriptor mode
    pub const CYCLIC_BD_ENABLE: u32 = 1 << 4;
    /// Interrupt on complete enable
    pub const IOC_IRQ_EN: u32 = 1 << 12;
    /// Delay interrupt enable
    pub const DLY_IRQ_EN: u32 = 1 << 13;
    /// Error interrupt enable
    pub const ERR_IRQ_EN: u32 = 1 << 14;
    /// Interrupt threshold shift
    pub const IRQ_THRESHOLD_SHIFT: u32 = 16;
    /// Interrupt threshold mask
    pub const IRQ_THRESHOLD_MASK: u32 = 0xFF << IRQ_THRESHOLD_SHIFT;
}

/// S2MM_DMASR bit fields
pub mod dmasr {
    /// Channel halted
    pub const HALTED: u32 = 1 << 0;
    /// Channel idle
    pub const IDLE: u32 = 1 << 1;
    /// Scatter-gather engine included
    pub const SG_INCLD: u32 = 1 << 3;
    /// Data mover internal error
    pub const DMA_INT_ERR: u32 = 1 << 4;
    /// Data mover slave error
    pub const DMA_SLV_ERR: u32 = 1 << 5;
    /// Data mover decode error
    pub const DMA_DEC_ERR: u32 = 1 << 6;
    /// Descriptor fetch internal error
    pub const SG_INT_ERR: u32 = 1 << 8;
    /// Descriptor fetch slave error
    pub const SG_SLV_ERR: u32 = 1 << 9;
    /// Descriptor fetch decode error
    pub const SG_DEC_ERR: u32 = 1 << 10;
    /// Interrupt on complete pending
    pub const IOC_IRQ: u32 = 1 << 12;
    /// Delay interrupt pending
    pub const DLY_IRQ: u32 = 1 << 13;
    /// Error interrupt pending
    pub const ERR_IRQ: u32 = 1 << 14;

    /// All error bits
    pub const ALL_ERRORS: u32 =
        DMA_INT_ERR | DMA_SLV_ERR | DMA_DEC_ERR | SG_INT_ERR | SG_SLV_ERR | SG_DEC_ERR;
}

/// Tail pointer programmed in cyclic mode. It must not match any descriptor
/// of the chain; descriptors are 64-byte aligned so this never does.
const CYCLIC_TAIL_MARKER: u64 = 0x50;

// =============================================================================
// Register Block
// =============================================================================

/// Typed access to the S2MM registers of an AXI DMA window
#[derive(Clone)]
pub struct AxiDmaRegs {
    regs: Arc<dyn RegisterInterface>,
}

impl AxiDmaRegs {
    /// Wrap an AXI DMA register window
    pub fn new(regs: Arc<dyn RegisterInterface>) -> Self {
        Self { regs }
    }

    reg_rw!(control, set_control, offset::S2MM_DMACR, "S2MM control register");
    reg_ro!(raw_status, offset::S2MM_DMASR, "S2MM status register");
    reg_bit_ops!(
        start_run,
        stop_run,
        offset::S2MM_DMACR,
        dmacr::RS,
        "the S2MM channel",
        "Run",
        "Stop"
    );

    /// Set the current descriptor pointer
    pub fn set_curdesc(&self, addr: u64) {
        self.regs.write_addr64(offset::S2MM_CURDESC, addr);
    }

    /// Current descriptor pointer
    pub fn curdesc(&self) -> u64 {
        self.regs.read_addr64(offset::S2MM_CURDESC)
    }

    /// Set the tail descriptor pointer (writing it starts descriptor fetch)
    pub fn set_taildesc(&self, addr: u64) {
        self.regs.write_addr64(offset::S2MM_TAILDESC, addr);
    }

    /// Decoded status register
    pub fn status(&self) -> EngineStatus {
        EngineStatus(self.raw_status())
    }
}

impl core::fmt::Debug for AxiDmaRegs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AxiDmaRegs")
            .field("region", &self.regs.region())
            .finish()
    }
}

// =============================================================================
// Status
// =============================================================================

/// Snapshot of the S2MM status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus(pub u32);

impl EngineStatus {
    /// Channel is halted
    #[inline(always)]
    pub fn is_halted(self) -> bool {
        self.0 & dmasr::HALTED != 0
    }

    /// Channel is idle
    #[inline(always)]
    pub fn is_idle(self) -> bool {
        self.0 & dmasr::IDLE != 0
    }

    /// Error bits only
    #[inline(always)]
    pub fn errors(self) -> u32 {
        self.0 & dmasr::ALL_ERRORS
    }

    /// `Err(EngineFault)` if any error bit is set
    pub fn fault(self) -> DmaResult<()> {
        if self.errors() != 0 {
            Err(DmaError::EngineFault { status: self.0 })
        } else {
            Ok(())
        }
    }

    /// Names of the error bits that are set
    pub fn error_names(self) -> impl Iterator<Item = &'static str> {
        const NAMES: [(u32, &str); 6] = [
            (dmasr::DMA_INT_ERR, "DMAIntErr"),
            (dmasr::DMA_SLV_ERR, "DMASlvErr"),
            (dmasr::DMA_DEC_ERR, "DMADecErr"),
            (dmasr::SG_INT_ERR, "SGIntErr"),
            (dmasr::SG_SLV_ERR, "SGSlvErr"),
            (dmasr::SG_DEC_ERR, "SGDecErr"),
        ];
        NAMES
            .into_iter()
            .filter(move |(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| name)
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Run state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Not armed
    #[default]
    Idle,
    /// Armed and cycling through the ring
    Running,
}

/// Arms and disarms the S2MM channel in cyclic scatter-gather mode
pub struct DmaEngineController<D: DelayNs> {
    regs: AxiDmaRegs,
    delay: D,
    state: EngineState,
}

impl<D: DelayNs> DmaEngineController<D> {
    /// Controller over an AXI DMA window; starts out `Idle`
    pub fn new(regs: Arc<dyn RegisterInterface>, delay: D) -> Self {
        Self {
            regs: AxiDmaRegs::new(regs),
            delay,
            state: EngineState::Idle,
        }
    }

    /// Current run state
    #[inline(always)]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Register block, for read-only observers such as the data handler
    pub fn regs(&self) -> &AxiDmaRegs {
        &self.regs
    }

    /// Reset the channel and start it at `first_desc` in cyclic mode.
    ///
    /// Fails with `AlreadyRunning` if the engine was started before and not
    /// stopped. A channel that stays halted is reported once, without retry.
    pub fn start(&mut self, first_desc: u64) -> DmaResult<()> {
        if self.state == EngineState::Running {
            return Err(DmaError::AlreadyRunning);
        }

        self.reset()?;
        self.regs.set_curdesc(first_desc);
        self.regs.set_control(
            dmacr::RS
                | dmacr::CYCLIC_BD_ENABLE
                | dmacr::IOC_IRQ_EN
                | dmacr::ERR_IRQ_EN
                | (1 << dmacr::IRQ_THRESHOLD_SHIFT),
        );
        self.regs.set_taildesc(CYCLIC_TAIL_MARKER);

        let status = self.regs.status();
        if status.is_halted() {
            self.regs.stop_run();
            warn!("AXI DMA did not start, DMASR = {:#010x}", status.0);
            return Err(DmaError::StartNotAcknowledged { status: status.0 });
        }

        self.state = EngineState::Running;
        info!("AXI DMA started at descriptor {first_desc:#x}");
        Ok(())
    }

    /// Clear the run bit. No-op when idle.
    pub fn stop(&mut self) {
        if self.state == EngineState::Idle {
            return;
        }
        self.regs.stop_run();
        self.state = EngineState::Idle;
        debug!("AXI DMA stopped, DMASR = {:#010x}", self.regs.raw_status());
    }

    /// Decoded status register
    pub fn status(&self) -> EngineStatus {
        self.regs.status()
    }

    /// `Err(EngineFault)` if the engine reports an error
    pub fn fault(&self) -> DmaResult<()> {
        self.status().fault()
    }

    fn reset(&mut self) -> DmaResult<()> {
        self.regs.set_control(dmacr::RESET);

        let mut waited = 0;
        while self.regs.control() & dmacr::RESET != 0 {
            if waited >= RESET_TIMEOUT_US {
                return Err(DmaError::ResetTimeout);
            }
            self.delay.delay_us(RESET_POLL_INTERVAL_US);
            waited += RESET_POLL_INTERVAL_US;
        }
        Ok(())
    }
}

impl<D: DelayNs> Drop for DmaEngineController<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
