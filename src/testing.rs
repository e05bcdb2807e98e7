//! Testing utilities and mock implementations
//!
//! Mocks for running the driver on the host without an FPGA:
//!
//! - [`MockRegisters`]: in-memory register window with self-clearing bits
//! - [`MockDmaBuffer`]: in-memory DMA buffer
//! - [`MockDelay`]: records delays without sleeping
//! - [`SimulatedFabric`]: a thread playing AXI DMA and traffic generator
//! - [`TempTree`]: throwaway sysfs/dev trees for the Linux transports
//!
//! Only available when running `cargo test`.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::buffer::{DmaBuffer, local_offset};
use crate::dma::descriptor::{control, offset as desc, status};
use crate::dma::engine::{dmacr, offset as dma_reg};
use crate::error::Result;
use crate::lfsr::{Lfsr, LfsrChecker};
use crate::peripheral::{GpioStatus, st_ctrl, tg_offset, tr_len};
use crate::region::PhysicalRegion;
use crate::register::RegisterInterface;

// =============================================================================
// Mock Registers
// =============================================================================

/// Register window backed by atomics
///
/// Bits registered with [`set_self_clearing`](Self::set_self_clearing)
/// read back as zero right after being written, like a reset bit that
/// completes instantly. Every write is logged.
#[derive(Debug)]
pub struct MockRegisters {
    words: Vec<AtomicU32>,
    region: PhysicalRegion,
    self_clearing: Mutex<HashMap<usize, u32>>,
    write_log: Mutex<Vec<(usize, u32)>>,
}

impl MockRegisters {
    /// Zeroed window of `size` bytes at physical address 0
    pub fn new(size: usize) -> Self {
        Self {
            words: (0..size / 4).map(|_| AtomicU32::new(0)).collect(),
            region: PhysicalRegion::new(0, size),
            self_clearing: Mutex::new(HashMap::new()),
            write_log: Mutex::new(Vec::new()),
        }
    }

    /// Report `region` as the window's physical placement
    #[must_use]
    pub fn with_region(mut self, region: PhysicalRegion) -> Self {
        self.region = region;
        self
    }

    /// Make `mask` bits of the register at `offset` clear on write
    pub fn set_self_clearing(&self, offset: usize, mask: u32) {
        self.self_clearing.lock().unwrap().insert(offset, mask);
    }

    /// All writes so far as `(offset, value)`
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.write_log.lock().unwrap().clone()
    }

    /// Forget logged writes
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    fn word(&self, offset: usize) -> &AtomicU32 {
        assert!(offset % 4 == 0, "unaligned register offset {offset:#x}");
        &self.words[offset / 4]
    }
}

impl RegisterInterface for MockRegisters {
    fn read32(&self, offset: usize) -> u32 {
        self.word(offset).load(Ordering::SeqCst)
    }

    fn write32(&self, offset: usize, value: u32) {
        let clear = self
            .self_clearing
            .lock()
            .unwrap()
            .get(&offset)
            .copied()
            .unwrap_or(0);
        self.write_log.lock().unwrap().push((offset, value));
        self.word(offset).store(value & !clear, Ordering::SeqCst);
    }

    fn region(&self) -> PhysicalRegion {
        self.region
    }
}

// =============================================================================
// Mock DMA Buffer
// =============================================================================

/// DMA buffer living in a `Vec`
#[derive(Debug)]
pub struct MockDmaBuffer {
    phys: PhysicalRegion,
    data: Mutex<Vec<u8>>,
    copies: AtomicUsize,
}

impl MockDmaBuffer {
    pub fn new(phys_addr: u64, size: usize) -> Self {
        Self {
            phys: PhysicalRegion::new(phys_addr, size),
            data: Mutex::new(vec![0; size]),
            copies: AtomicUsize::new(0),
        }
    }

    /// Store `data` at physical `addr`, as the engine would
    pub fn write_at(&self, addr: u64, data: &[u8]) {
        let offset = local_offset(self.phys, PhysicalRegion::new(addr, data.len()))
            .expect("mock write outside buffer");
        self.data.lock().unwrap()[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Number of successful `copy_out` calls
    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }
}

impl DmaBuffer for MockDmaBuffer {
    fn phys_addr(&self) -> u64 {
        self.phys.addr
    }

    fn size(&self) -> usize {
        self.phys.size
    }

    fn copy_out(&self, region: PhysicalRegion, out: &mut Vec<u8>) -> Result<()> {
        let offset = local_offset(self.phys, region)?;
        out.extend_from_slice(&self.data.lock().unwrap()[offset..offset + region.size]);
        self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Mock Delay
// =============================================================================

/// Mock delay for testing without actual timing
#[derive(Debug, Default)]
pub struct MockDelay {
    total_ns: AtomicU64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total nanoseconds "delayed"
    pub fn total_ns(&self) -> u64 {
        self.total_ns.load(Ordering::SeqCst)
    }

    /// Total microseconds "delayed"
    pub fn total_us(&self) -> u64 {
        self.total_ns() / 1_000
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.fetch_add(u64::from(ns), Ordering::SeqCst);
    }
}

// =============================================================================
// Simulated Hardware
// =============================================================================

/// The register windows and buffer of one FPGA design, all mocked
pub struct MockHardware {
    pub gpio: Arc<MockRegisters>,
    pub dma: Arc<MockRegisters>,
    pub bram: Arc<MockRegisters>,
    pub traffic_gen: Arc<MockRegisters>,
    pub buffer: Arc<MockDmaBuffer>,
}

impl MockHardware {
    pub const BRAM_ADDR: u64 = 0xA000_0000;
    pub const BUFFER_ADDR: u64 = 0x7F00_0000;

    /// Calibrated hardware with room for `ring_entries` descriptors and a
    /// `buffer_size` byte buffer
    pub fn new(ring_entries: usize, buffer_size: usize) -> Self {
        let gpio = Arc::new(MockRegisters::new(0x10));
        gpio.write32(0, GpioStatus::DDR4_INIT_CALIB_COMPLETE);

        let dma = Arc::new(MockRegisters::new(0x100));
        dma.set_self_clearing(dma_reg::S2MM_DMACR, dmacr::RESET);

        let bram_len = ring_entries * 0x40;
        Self {
            gpio,
            dma,
            bram: Arc::new(
                MockRegisters::new(bram_len)
                    .with_region(PhysicalRegion::new(Self::BRAM_ADDR, bram_len)),
            ),
            traffic_gen: Arc::new(MockRegisters::new(0x100)),
            buffer: Arc::new(MockDmaBuffer::new(Self::BUFFER_ADDR, buffer_size)),
        }
    }
}

/// Seed of the simulated traffic generator LFSR
pub const FABRIC_SEED: u16 = 0xACE1;

/// Thread emulating the AXI DMA S2MM channel fed by the traffic generator
///
/// Once both the run bit and streaming are enabled, it emits the
/// configured packets into the descriptor ring, waiting for the consumer
/// to release a slot before reusing it. Each unit of `pause` slows it by
/// 100 µs per packet.
pub struct SimulatedFabric {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<u64>>,
}

impl SimulatedFabric {
    /// Start emulating `hw`, corrupting packet number `corrupt` if given
    pub fn spawn(hw: &MockHardware, corrupt: Option<u64>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let fabric = FabricThread {
            dma: Arc::clone(&hw.dma),
            bram: Arc::clone(&hw.bram),
            tg: Arc::clone(&hw.traffic_gen),
            buffer: Arc::clone(&hw.buffer),
            stop: Arc::clone(&stop),
            corrupt,
        };
        let thread = std::thread::Builder::new()
            .name("simulated-fabric".into())
            .spawn(move || fabric.run())
            .unwrap();
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Stop the thread and return how many packets it emitted
    pub fn shutdown(mut self) -> u64 {
        self.stop.store(true, Ordering::SeqCst);
        self.thread.take().map_or(0, |t| t.join().unwrap())
    }
}

impl Drop for SimulatedFabric {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct FabricThread {
    dma: Arc<MockRegisters>,
    bram: Arc<MockRegisters>,
    tg: Arc<MockRegisters>,
    buffer: Arc<MockDmaBuffer>,
    stop: Arc<AtomicBool>,
    corrupt: Option<u64>,
}

impl FabricThread {
    fn running(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
            && self.tg.read32(tg_offset::ST_CTRL) & st_ctrl::STREN != 0
            && self.dma.read32(dma_reg::S2MM_DMACR) & dmacr::RS != 0
    }

    fn run(self) -> u64 {
        while !self.running() {
            if self.stop.load(Ordering::SeqCst) {
                return 0;
            }
            std::thread::sleep(Duration::from_micros(100));
        }

        let tr = self.tg.read32(tg_offset::TR_LEN);
        let count = u64::from(tr >> tr_len::TCNT_SHIFT);
        let ext = self.tg.read32(tg_offset::EXT_TR_LEN) & tr_len::EXT_TLEN_MASK;
        let beats = (((ext << 16) | (tr & tr_len::TLEN_MASK)) + 1) as usize;
        let pause = self.tg.read32(tg_offset::ST_CONFIG) >> tr_len::PDLY_SHIFT;

        let mut lfsr = Lfsr::new(FABRIC_SEED);
        let mut desc_addr = self.dma.read_addr64(dma_reg::S2MM_CURDESC);
        let mut emitted = 0;

        for n in 0..count {
            if !self.running() {
                break;
            }
            let mut data = LfsrChecker::generate(&mut lfsr, beats);
            if self.corrupt == Some(n) {
                let mid = data.len() / 2;
                data[mid] ^= 0x5A;
            }
            match self.emit(&data, desc_addr) {
                Some(next) => desc_addr = next,
                None => break,
            }
            emitted += 1;
            if pause > 0 {
                std::thread::sleep(Duration::from_micros(u64::from(pause) * 100));
            }
        }

        self.tg.set_bits(tg_offset::ST_CTRL, st_ctrl::DONE);
        emitted
    }

    /// Write one packet starting at descriptor `desc_addr`; returns the
    /// descriptor following the last one used.
    fn emit(&self, data: &[u8], mut desc_addr: u64) -> Option<u64> {
        let mut written = 0;
        while written < data.len() {
            let base = (desc_addr - MockHardware::BRAM_ADDR) as usize;
            while self.bram.read32(base + desc::STATUS) != 0 {
                if !self.running() {
                    return None;
                }
                std::thread::sleep(Duration::from_micros(50));
            }

            let dst = self.bram.read_addr64(base + desc::BUFFER_ADDRESS);
            let cap = (self.bram.read32(base + desc::CONTROL) & control::BUFFER_LEN_MASK) as usize;
            let chunk = cap.min(data.len() - written);
            self.buffer.write_at(dst, &data[written..written + chunk]);

            let mut word = status::CMPLT | chunk as u32;
            if written == 0 {
                word |= status::RXSOF;
            }
            written += chunk;
            if written == data.len() {
                word |= status::RXEOF;
            }
            self.bram.write32(base + desc::STATUS, word);
            desc_addr = self.bram.read_addr64(base + desc::NXTDESC);
        }
        Some(desc_addr)
    }
}

// =============================================================================
// Temporary Directory Trees
// =============================================================================

static TREE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Temporary directory removed on drop
#[derive(Debug)]
pub struct TempTree {
    root: PathBuf,
}

impl TempTree {
    pub fn new() -> Self {
        let n = TREE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let root = std::env::temp_dir().join(format!("ph-axi-dma-{}-{n}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    /// Absolute path of `rel` inside the tree
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    /// Create file `rel` (and its parents) holding `bytes`
    pub fn file(&self, rel: impl AsRef<Path>, bytes: &[u8]) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Fake `uio<index>` named `name` with map 0 at `addr`
    pub fn uio_device(&self, index: u32, name: &str, addr: u64, size: usize) {
        let sys = format!("sys/class/uio/uio{index}");
        self.file(format!("{sys}/name"), format!("{name}\n").as_bytes());
        self.file(format!("{sys}/maps/map0/addr"), format!("{addr:#x}\n").as_bytes());
        self.file(format!("{sys}/maps/map0/size"), format!("{size:#x}\n").as_bytes());
        self.file(format!("dev/uio{index}"), &vec![0; size]);
    }

    /// Fake `udmabuf<index>` at physical `phys`
    pub fn udmabuf(&self, index: u32, phys: u64, size: usize) {
        let sys = format!("sys/class/u-dma-buf/udmabuf{index}");
        self.file(format!("{sys}/size"), format!("{size}\n").as_bytes());
        self.file(format!("{sys}/phys_addr"), format!("{phys:#x}\n").as_bytes());
        self.file(format!("dev/udmabuf{index}"), &vec![0; size]);
    }
}

impl Drop for TempTree {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::delay::DelayNs;

    #[test]
    fn self_clearing_bits_read_back_zero() {
        let regs = MockRegisters::new(0x40);
        regs.set_self_clearing(0x30, 0x4);
        regs.write32(0x30, 0x5);
        assert_eq!(regs.read32(0x30), 0x1);
        assert_eq!(regs.writes(), [(0x30, 0x5)]);
    }

    #[test]
    fn mock_delay_tracking() {
        let mut delay = MockDelay::new();
        delay.delay_us(10);
        delay.delay_ms(1);
        assert_eq!(delay.total_us(), 1010);
    }

    #[test]
    fn temp_tree_cleans_up() {
        let tree = TempTree::new();
        let path = tree.file("a/b/c", b"x");
        assert!(path.exists());
        let root = tree.path("");
        drop(tree);
        assert!(!root.exists());
    }
}
