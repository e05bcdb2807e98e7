//! One streaming run from arming to teardown
//!
//! [`DmaSession::run`] performs, in order:
//!
//! 1. calibration check (no hardware is touched if it fails)
//! 2. descriptor ring write
//! 3. engine start
//! 4. data handler spawn
//! 5. traffic generator start
//! 6. supervision until the handler finishes or the caller interrupts
//! 7. generator stop, engine stop
//!
//! Any failure after step 3 still disarms what was armed.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::buffer::{DmaBuffer, FpgaMemBuffer, UDmaBuf};
use crate::config::{HardwareMap, SessionConfig};
use crate::delay::StdDelay;
use crate::dma::{DmaEngineController, ScatterGatherRing};
use crate::error::{ConfigError, DmaError, Result};
use crate::handler::{DataHandler, HandlerHandle, Termination, TransferTarget, WaitStatus};
use crate::peripheral::{GpioStatus, TrafficGenerator};
use crate::register::{DmaMode, RegisterFactory, RegisterInterface};

/// Outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Packets that matched the expected pattern
    pub packets_ok: u64,
    /// Packets observed
    pub packets_total: u64,
    /// Why the handler stopped
    pub termination: Termination,
}

impl RunSummary {
    /// True if every observed packet was valid
    pub fn is_success(&self) -> bool {
        self.packets_ok == self.packets_total
    }
}

/// The hardware a session drives
pub struct SessionParts {
    /// Status GPIO window
    pub gpio: Arc<dyn RegisterInterface>,
    /// AXI DMA window
    pub dma: Arc<dyn RegisterInterface>,
    /// Descriptor memory window
    pub desc_mem: Arc<dyn RegisterInterface>,
    /// Traffic generator window
    pub traffic_gen: Arc<dyn RegisterInterface>,
    /// DMA target buffer
    pub buffer: Arc<dyn DmaBuffer>,
}

/// Owns the hardware of one streaming path
pub struct DmaSession {
    config: SessionConfig,
    gpio: GpioStatus,
    engine: DmaEngineController<StdDelay>,
    desc_mem: Arc<dyn RegisterInterface>,
    traffic_gen: TrafficGenerator,
    buffer: Arc<dyn DmaBuffer>,
}

impl DmaSession {
    /// Acquire every resource named by `hw` for `config.mode`.
    ///
    /// Fails before anything is armed if a device or buffer is missing.
    pub fn open(config: SessionConfig, hw: &HardwareMap) -> Result<Self> {
        config.validate()?;
        let factory = RegisterFactory::new(config.mode.clone(), hw.pcie_axi4l_offset);

        let gpio = factory.create(&hw.gpio_status)?;
        let dma = factory.create(&hw.axi_dma)?;
        let desc_mem = factory.create(&hw.desc_bram)?;
        let traffic_gen = factory.create(&hw.traffic_gen)?;
        let buffer: Arc<dyn DmaBuffer> = match &config.mode {
            DmaMode::Uio => Arc::new(UDmaBuf::open(hw.udmabuf_index)?),
            DmaMode::Xdma { dev_path } => Arc::new(FpgaMemBuffer::open(
                dev_path,
                hw.fpga_mem.addr,
                hw.fpga_mem.size,
            )?),
        };

        Self::from_parts(
            config,
            SessionParts {
                gpio,
                dma,
                desc_mem,
                traffic_gen,
                buffer,
            },
        )
    }

    /// Build a session over already acquired hardware
    pub fn from_parts(config: SessionConfig, parts: SessionParts) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            gpio: GpioStatus::new(parts.gpio),
            engine: DmaEngineController::new(parts.dma, StdDelay),
            desc_mem: parts.desc_mem,
            traffic_gen: TrafficGenerator::new(parts.traffic_gen),
            buffer: parts.buffer,
        })
    }

    /// Session settings
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stream `packet_count` packets and validate them.
    ///
    /// `interrupted` is polled once per wait step; when it returns true the
    /// handler is asked to stop and the partial result is reported.
    pub fn run(&mut self, interrupted: impl Fn() -> bool) -> Result<RunSummary> {
        if !self.gpio.is_ddr4_init_calib_complete() {
            return Err(ConfigError::CalibrationIncomplete.into());
        }
        let ring = self.write_ring()?;

        self.engine.start(ring.first_desc_addr())?;
        let mut handle = match self.spawn_handler(ring) {
            Ok(handle) => handle,
            Err(e) => {
                self.engine.stop();
                return Err(e);
            }
        };

        let cfg = &self.config;
        if let Err(e) = self
            .traffic_gen
            .start(cfg.packet_count, cfg.packet_len, cfg.packet_pause)
        {
            drop(handle.stop_and_join());
            self.engine.stop();
            return Err(e.into());
        }
        info!(
            "streaming {} packets of {} bytes",
            cfg.packet_count, cfg.packet_len
        );

        while handle.wait_for(cfg.poll_interval) == WaitStatus::Pending {
            if interrupted() {
                warn!("interrupted, stopping data handler");
                handle.stop();
                break;
            }
        }
        let outcome = handle.join();

        self.traffic_gen.stop();
        self.engine.stop();
        let report = outcome?;

        let summary = RunSummary {
            packets_ok: report.counters.ok,
            packets_total: report.counters.total,
            termination: report.termination,
        };
        info!(
            "Counters: OK = {}, total = {}",
            summary.packets_ok, summary.packets_total
        );
        Ok(summary)
    }

    fn write_ring(&self) -> Result<Arc<ScatterGatherRing>> {
        let cfg = &self.config;
        let needed = cfg.ring_bytes();
        if needed > self.buffer.size() {
            return Err(DmaError::RegionOutOfBounds {
                addr: self.buffer.phys_addr(),
                size: needed,
            }
            .into());
        }
        let ring = ScatterGatherRing::write_cyclic(
            Arc::clone(&self.desc_mem),
            self.buffer.phys_addr(),
            cfg.ring_entries,
            cfg.entry_len,
        )?;
        debug!("ring written, first descriptor {:#x}", ring.first_desc_addr());
        Ok(Arc::new(ring))
    }

    fn spawn_handler(&self, ring: Arc<ScatterGatherRing>) -> Result<HandlerHandle> {
        let cfg = &self.config;
        DataHandler::new(
            self.engine.regs().clone(),
            ring,
            Arc::clone(&self.buffer),
            TransferTarget::Bytes(cfg.target_bytes()),
        )
        .packet_len(cfg.packet_len)
        .poll_interval(cfg.poll_interval)
        .max_idle(cfg.max_idle)
        .spawn()
    }
}
