//! Concurrent consumer of completed DMA transfers
//!
//! The [`DataHandler`] runs on its own thread. It polls the descriptor ring
//! for completed slots, copies their data out of the DMA buffer, splits the
//! stream into packets and validates each one. Progress is published as a
//! consistent `(ok, total)` pair; the final result comes back through the
//! [`HandlerHandle`].
//!
//! The handler never touches engine control registers. Its only writes are
//! descriptor status words, which it clears to hand a slot back.
//!
//! # Termination
//!
//! Checked once per poll iteration, never in the middle of a copy:
//!
//! - the target amount was consumed: [`Termination::Completed`]
//! - a stop was requested: one last drain, then [`Termination::Cancelled`]
//! - nothing arrived for longer than `max_idle`: [`Termination::TimedOut`]
//!
//! An engine fault ends the run with [`DmaError::EngineFault`].

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::buffer::DmaBuffer;
use crate::constants::{DEFAULT_PACKET_LEN, DEFAULT_POLL_INTERVAL};
use crate::delay::StdDelay;
use crate::dma::{AxiDmaRegs, RingCursor, ScatterGatherRing};
use crate::error::{ConfigError, IoError, IoResult, ResourceError, Result};
use crate::lfsr::{LfsrChecker, PacketCheck};
use crate::region::PhysicalRegion;
use crate::sync::{Counters, CriticalSectionCell, StopToken};

const THREAD_NAME: &str = "dma-data-handler";

/// How much data ends a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferTarget {
    /// Total number of bytes
    Bytes(usize),
    /// Number of packets
    Packets(u64),
}

impl TransferTarget {
    fn reached(self, bytes: usize, counters: Counters) -> bool {
        match self {
            TransferTarget::Bytes(n) => bytes >= n,
            TransferTarget::Packets(n) => counters.total >= n,
        }
    }
}

/// Why a handler run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The target amount was consumed
    Completed,
    /// A stop was requested
    Cancelled,
    /// No data arrived within the idle limit
    TimedOut,
}

/// Final result of a handler run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerReport {
    /// Packet counters at the end of the run
    pub counters: Counters,
    /// Bytes copied out of the DMA buffer
    pub bytes: usize,
    /// Why the run ended
    pub termination: Termination,
}

/// Outcome of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The handler finished; `join` returns without blocking
    Ready,
    /// Still running
    Pending,
}

/// Consumer configuration; [`spawn`](Self::spawn) starts it
pub struct DataHandler<D: DelayNs = StdDelay> {
    dma: AxiDmaRegs,
    ring: Arc<ScatterGatherRing>,
    buffer: Arc<dyn DmaBuffer>,
    target: TransferTarget,
    packet_len: usize,
    poll_interval: Duration,
    max_idle: Option<Duration>,
    checker: Box<dyn PacketCheck>,
    forward_data: bool,
    delay: D,
}

impl DataHandler<StdDelay> {
    /// Consumer of `ring` over `buffer`, watching `dma` for faults
    pub fn new(
        dma: AxiDmaRegs,
        ring: Arc<ScatterGatherRing>,
        buffer: Arc<dyn DmaBuffer>,
        target: TransferTarget,
    ) -> Self {
        Self {
            dma,
            ring,
            buffer,
            target,
            packet_len: DEFAULT_PACKET_LEN,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_idle: None,
            checker: Box::new(LfsrChecker::new()),
            forward_data: false,
            delay: StdDelay,
        }
    }
}

impl<D: DelayNs + Send + 'static> DataHandler<D> {
    /// Packet length in bytes used to split the stream
    #[must_use]
    pub fn packet_len(mut self, len: usize) -> Self {
        self.packet_len = len;
        self
    }

    /// Sleep between polls that found nothing
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Give up after this long without new data
    #[must_use]
    pub fn max_idle(mut self, limit: Option<Duration>) -> Self {
        self.max_idle = limit;
        self
    }

    /// Packet validation
    #[must_use]
    pub fn checker(mut self, checker: impl PacketCheck + 'static) -> Self {
        self.checker = Box::new(checker);
        self
    }

    /// Forward every copied chunk to [`HandlerHandle::read`]
    #[must_use]
    pub fn forward_data(mut self, enable: bool) -> Self {
        self.forward_data = enable;
        self
    }

    /// Use another delay provider for the poll sleep
    pub fn with_delay<D2: DelayNs + Send + 'static>(self, delay: D2) -> DataHandler<D2> {
        DataHandler {
            dma: self.dma,
            ring: self.ring,
            buffer: self.buffer,
            target: self.target,
            packet_len: self.packet_len,
            poll_interval: self.poll_interval,
            max_idle: self.max_idle,
            checker: self.checker,
            forward_data: self.forward_data,
            delay,
        }
    }

    /// Start the consumer thread.
    pub fn spawn(self) -> Result<HandlerHandle> {
        if self.packet_len == 0 {
            return Err(ConfigError::InvalidConfig("packet length must not be zero").into());
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidConfig("poll interval must not be zero").into());
        }

        let stop = StopToken::new();
        let progress = Arc::new(CriticalSectionCell::new(Counters::default()));
        let (result_tx, result_rx) = mpsc::channel();
        let (data_tx, data_rx) = if self.forward_data {
            let (tx, rx) = mpsc::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let worker = Worker {
            cfg: self,
            stop: stop.clone(),
            progress: Arc::clone(&progress),
            data_tx,
            pending: Vec::new(),
            bytes: 0,
            counters: Counters::default(),
        };
        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                let result = worker.run();
                // Nobody is listening if the handle was leaked
                let _ = result_tx.send(result);
            })
            .map_err(ResourceError::Spawn)?;

        Ok(HandlerHandle {
            stop,
            progress,
            result_rx,
            result: None,
            data_rx,
            thread: Some(thread),
        })
    }
}

struct Worker<D: DelayNs> {
    cfg: DataHandler<D>,
    stop: StopToken,
    progress: Arc<CriticalSectionCell<Counters>>,
    data_tx: Option<Sender<Vec<u8>>>,
    pending: Vec<u8>,
    bytes: usize,
    counters: Counters,
}

impl<D: DelayNs> Worker<D> {
    fn run(mut self) -> Result<HandlerReport> {
        let mut cursor = RingCursor::new(self.cfg.ring.len());
        let mut last_data = Instant::now();
        debug!("data handler: target {:?}", self.cfg.target);

        let termination = loop {
            let stop_requested = self.stop.is_stopped();

            let status = self.cfg.dma.status();
            if let Err(e) = status.fault() {
                let names: Vec<_> = status.error_names().collect();
                error!("DMA engine fault: {}", names.join(", "));
                return Err(e.into());
            }

            let drained = self.drain(&mut cursor)?;
            if drained > 0 {
                last_data = Instant::now();
            }

            if self.cfg.target.reached(self.bytes, self.counters) {
                break Termination::Completed;
            }
            if stop_requested {
                break Termination::Cancelled;
            }
            if let Some(limit) = self.cfg.max_idle
                && last_data.elapsed() > limit
            {
                warn!("no DMA data for {limit:?}, giving up");
                break Termination::TimedOut;
            }

            if drained == 0 {
                let us = u32::try_from(self.cfg.poll_interval.as_micros()).unwrap_or(u32::MAX);
                self.cfg.delay.delay_us(us);
            }
        };

        info!(
            "data handler done ({termination:?}): ok = {}, total = {}, {} bytes",
            self.counters.ok, self.counters.total, self.bytes
        );
        Ok(HandlerReport {
            counters: self.counters,
            bytes: self.bytes,
            termination,
        })
    }

    /// Consume completed slots from the cursor on, at most one lap.
    fn drain(&mut self, cursor: &mut RingCursor) -> Result<usize> {
        let ring = Arc::clone(&self.cfg.ring);
        let mut drained = 0;

        while drained < ring.len() {
            let index = cursor.current_index();
            let Some(len) = ring.completed(index) else {
                break;
            };
            let entry = ring.entry(index);
            let region = PhysicalRegion::new(entry.destination, len.min(entry.length));

            let start = self.pending.len();
            self.cfg.buffer.copy_out(region, &mut self.pending)?;
            if let Some(tx) = &self.data_tx {
                let _ = tx.send(self.pending[start..].to_vec());
            }
            ring.release(index);
            cursor.advance();
            drained += 1;
            self.bytes += region.size;

            self.validate_packets();
            if self.cfg.target.reached(self.bytes, self.counters) {
                break;
            }
        }
        Ok(drained)
    }

    fn validate_packets(&mut self) {
        let packet_len = self.cfg.packet_len;
        let complete = self.pending.len() / packet_len * packet_len;
        if complete == 0 {
            return;
        }

        for packet in self.pending[..complete].chunks_exact(packet_len) {
            let valid = self.cfg.checker.check(packet);
            if !valid {
                warn!("packet {} does not match the expected pattern", self.counters.total);
            }
            self.counters.record(valid);
        }
        self.pending.drain(..complete);
        let counters = self.counters;
        self.progress.with(|c| *c = counters);
    }
}

/// Handle to a running [`DataHandler`]
///
/// Dropping the handle stops the handler and waits for it.
pub struct HandlerHandle {
    stop: StopToken,
    progress: Arc<CriticalSectionCell<Counters>>,
    result_rx: Receiver<Result<HandlerReport>>,
    result: Option<Result<HandlerReport>>,
    data_rx: Option<Receiver<Vec<u8>>>,
    thread: Option<JoinHandle<()>>,
}

impl HandlerHandle {
    /// Request a cooperative stop. Idempotent, callable from any thread
    /// holding the handle.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Token that stops this handler when triggered
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Wait up to `timeout` for the handler to finish
    pub fn wait_for(&mut self, timeout: Duration) -> WaitStatus {
        if self.result.is_some() {
            return WaitStatus::Ready;
        }
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => {
                self.result = Some(result);
                WaitStatus::Ready
            }
            Err(RecvTimeoutError::Timeout) => WaitStatus::Pending,
            // The thread is gone without a result; join reports why
            Err(RecvTimeoutError::Disconnected) => WaitStatus::Ready,
        }
    }

    /// True once the handler thread has ended
    pub fn is_finished(&self) -> bool {
        self.result.is_some() || self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Consistent snapshot of the counters
    pub fn progress(&self) -> Counters {
        self.progress.get()
    }

    /// Next forwarded data chunk, waiting at most `timeout`
    pub fn read(&self, timeout: Duration) -> IoResult<Vec<u8>> {
        let rx = self.data_rx.as_ref().ok_or(IoError::InvalidState)?;
        rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => IoError::Timeout,
            RecvTimeoutError::Disconnected => IoError::InvalidState,
        })
    }

    /// Block until the handler ends and return its result.
    ///
    /// A panic on the handler thread is resumed on the caller.
    pub fn join(mut self) -> Result<HandlerReport> {
        self.join_inner()
    }

    /// Stop the handler and wait for its result
    pub fn stop_and_join(self) -> Result<HandlerReport> {
        self.stop();
        self.join()
    }

    fn join_inner(&mut self) -> Result<HandlerReport> {
        if let Some(thread) = self.thread.take()
            && let Err(panic) = thread.join()
        {
            std::panic::resume_unwind(panic);
        }
        match self.result.take() {
            Some(result) => result,
            None => self
                .result_rx
                .try_recv()
                .unwrap_or(Err(IoError::InvalidState.into())),
        }
    }
}

impl Drop for HandlerHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop.stop();
            if thread.join().is_err() {
                warn!("data handler thread panicked");
            }
        }
    }
}

impl core::fmt::Debug for HandlerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerHandle")
            .field("progress", &self.progress())
            .field("stopped", &self.stop.is_stopped())
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::engine::{dmasr, offset};
    use crate::error::{DmaError, Error};
    use crate::lfsr::Lfsr;
    use crate::register::RegisterInterface;
    use crate::testing::{MockDmaBuffer, MockRegisters};

    const BUF_PHYS: u64 = 0x7F00_0000;
    const ENTRY: usize = 0x100;

    struct Rig {
        dma: Arc<MockRegisters>,
        bram: Arc<MockRegisters>,
        buffer: Arc<MockDmaBuffer>,
        ring: Arc<ScatterGatherRing>,
    }

    impl Rig {
        fn new(entries: usize) -> Self {
            let dma = Arc::new(MockRegisters::new(0x100));
            let bram = Arc::new(
                MockRegisters::new(entries * 0x40)
                    .with_region(PhysicalRegion::new(0xA000_0000, entries * 0x40)),
            );
            let buffer = Arc::new(MockDmaBuffer::new(BUF_PHYS, entries * ENTRY));
            let ring = Arc::new(
                ScatterGatherRing::write_cyclic(bram.clone(), BUF_PHYS, entries, ENTRY).unwrap(),
            );
            Self {
                dma,
                bram,
                buffer,
                ring,
            }
        }

        fn handler(&self, target: TransferTarget) -> DataHandler {
            DataHandler::new(
                AxiDmaRegs::new(self.dma.clone()),
                Arc::clone(&self.ring),
                self.buffer.clone(),
                target,
            )
            .poll_interval(Duration::from_millis(1))
        }

        /// Emulate the engine filling slot `index`
        fn complete(&self, index: usize, data: &[u8]) {
            let entry = self.ring.entry(index);
            self.buffer.write_at(entry.destination, data);
            self.bram
                .write32(index * 0x40 + 0x1C, (1 << 31) | (1 << 26) | data.len() as u32);
        }
    }

    #[test]
    fn consumes_packets_until_target() {
        let rig = Rig::new(8);
        let mut lfsr = Lfsr::new(0xBEEF);
        for i in 0..4 {
            rig.complete(i, &LfsrChecker::generate(&mut lfsr, 4));
        }

        let handle = rig
            .handler(TransferTarget::Bytes(4 * 64))
            .packet_len(64)
            .spawn()
            .unwrap();
        let report = handle.join().unwrap();

        assert_eq!(report.termination, Termination::Completed);
        assert_eq!(report.counters, Counters { ok: 4, total: 4 });
        assert_eq!(report.bytes, 256);
        for i in 0..4 {
            assert_eq!(rig.ring.completed(i), None, "slot {i} released");
        }
    }

    #[test]
    fn bad_packets_are_counted_not_raised() {
        let rig = Rig::new(4);
        let mut lfsr = Lfsr::new(1);
        let good = LfsrChecker::generate(&mut lfsr, 2);
        let mut bad = LfsrChecker::generate(&mut lfsr, 2);
        bad[0] ^= 0xFF;
        rig.complete(0, &good);
        rig.complete(1, &bad);

        let report = rig
            .handler(TransferTarget::Packets(2))
            .packet_len(32)
            .spawn()
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(report.counters, Counters { ok: 1, total: 2 });
    }

    #[test]
    fn packets_may_span_slots() {
        let rig = Rig::new(4);
        let mut lfsr = Lfsr::new(7);
        let packet = LfsrChecker::generate(&mut lfsr, 20);
        rig.complete(0, &packet[..ENTRY]);
        rig.complete(1, &packet[ENTRY..]);

        let report = rig
            .handler(TransferTarget::Packets(1))
            .packet_len(packet.len())
            .spawn()
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(report.counters, Counters { ok: 1, total: 1 });
    }

    #[test]
    fn stop_ends_an_idle_handler() {
        let rig = Rig::new(4);
        let mut handle = rig.handler(TransferTarget::Packets(10)).spawn().unwrap();
        assert_eq!(handle.wait_for(Duration::from_millis(20)), WaitStatus::Pending);

        let started = Instant::now();
        handle.stop();
        handle.stop();
        assert_eq!(handle.wait_for(Duration::from_secs(5)), WaitStatus::Ready);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(handle.is_finished());

        let report = handle.join().unwrap();
        assert_eq!(report.termination, Termination::Cancelled);
        assert!(report.counters.total < 10);
    }

    #[test]
    fn stop_is_observed_within_one_poll_interval() {
        // scheduling allowance on top of the poll interval
        const SLACK: Duration = Duration::from_millis(20);
        let bound = DEFAULT_POLL_INTERVAL + SLACK;

        let rig = Rig::new(4);
        for _ in 0..5 {
            let mut handle = rig
                .handler(TransferTarget::Packets(10))
                .poll_interval(DEFAULT_POLL_INTERVAL)
                .spawn()
                .unwrap();
            assert_eq!(handle.wait_for(Duration::from_millis(15)), WaitStatus::Pending);

            let requested = Instant::now();
            handle.stop();
            assert_eq!(handle.wait_for(bound), WaitStatus::Ready);
            assert!(
                requested.elapsed() <= bound,
                "stop took {:?}",
                requested.elapsed()
            );
            assert_eq!(handle.join().unwrap().termination, Termination::Cancelled);
        }
    }

    #[test]
    fn data_present_at_stop_is_drained() {
        let rig = Rig::new(4);
        let mut lfsr = Lfsr::new(3);
        rig.complete(0, &LfsrChecker::generate(&mut lfsr, 1));
        rig.complete(1, &LfsrChecker::generate(&mut lfsr, 1));

        let handle = rig.handler(TransferTarget::Packets(100)).packet_len(16).spawn().unwrap();
        let report = handle.stop_and_join().unwrap();
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.counters, Counters { ok: 2, total: 2 });
    }

    #[test]
    fn idle_limit_times_out() {
        let rig = Rig::new(2);
        let report = rig
            .handler(TransferTarget::Packets(1))
            .max_idle(Some(Duration::from_millis(20)))
            .spawn()
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(report.termination, Termination::TimedOut);
        assert_eq!(report.counters.total, 0);
    }

    #[test]
    fn engine_fault_is_an_error() {
        let rig = Rig::new(2);
        rig.dma.write32(offset::S2MM_DMASR, dmasr::DMA_DEC_ERR);
        let err = rig.handler(TransferTarget::Packets(1)).spawn().unwrap().join().unwrap_err();
        assert!(matches!(err, Error::Dma(DmaError::EngineFault { .. })));
    }

    #[test]
    fn forwarded_data_can_be_read() {
        let rig = Rig::new(4);
        rig.complete(0, &[0xAB; 16]);

        let handle = rig
            .handler(TransferTarget::Bytes(16))
            .packet_len(16)
            .forward_data(true)
            .spawn()
            .unwrap();
        assert_eq!(handle.read(Duration::from_secs(5)).unwrap(), vec![0xAB; 16]);
        assert!(handle.read(Duration::from_millis(10)).is_err());
        handle.join().unwrap();
    }

    #[test]
    fn read_without_forwarding_is_invalid() {
        let rig = Rig::new(2);
        let handle = rig.handler(TransferTarget::Packets(1)).spawn().unwrap();
        assert_eq!(handle.read(Duration::ZERO), Err(IoError::InvalidState));
        handle.stop();
    }

    #[test]
    fn zero_packet_len_is_rejected() {
        let rig = Rig::new(2);
        assert!(rig.handler(TransferTarget::Packets(1)).packet_len(0).spawn().is_err());
    }

    #[test]
    fn progress_is_published() {
        let rig = Rig::new(4);
        let mut lfsr = Lfsr::new(9);
        rig.complete(0, &LfsrChecker::generate(&mut lfsr, 1));

        let mut handle = rig.handler(TransferTarget::Packets(2)).packet_len(16).spawn().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.progress().total < 1 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(handle.progress(), Counters { ok: 1, total: 1 });
        assert_eq!(handle.wait_for(Duration::from_millis(5)), WaitStatus::Pending);

        rig.complete(1, &LfsrChecker::generate(&mut lfsr, 1));
        assert_eq!(handle.wait_for(Duration::from_secs(5)), WaitStatus::Ready);
        assert_eq!(handle.join().unwrap().counters, Counters { ok: 2, total: 2 });
    }

    #[test]
    fn dropping_the_handle_stops_the_thread() {
        let rig = Rig::new(2);
        let handle = rig.handler(TransferTarget::Packets(1)).spawn().unwrap();
        let token = handle.stop_token();
        drop(handle);
        assert!(token.is_stopped());
    }
}
