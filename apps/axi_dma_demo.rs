//! AXI DMA streaming demo
//!
//! Streams packets from the AXI Traffic Generator through the AXI DMA
//! engine into host memory and validates their LFSR pattern.
//!
//! # Usage
//!
//! ```bash
//! axi-dma-demo --mode uio --nr-pkts 50 --pkt-len 1024
//! axi-dma-demo --mode xdma --dev-path /dev/xdma/slot4 --debug
//! ```
//!
//! # Options
//!
//! - `--mode uio|xdma`: transport (default `uio`)
//! - `--dev-path PATH`: XDMA device directory (required for `xdma`)
//! - `--nr-pkts N`: packets to request (default 1)
//! - `--pkt-len BYTES`: packet length, multiple of 16 (default 1024)
//! - `--pkt-pause CYCLES`: pause between packets (default 10)
//! - `--hw-map FILE`: TOML hardware map overriding the built-in one
//! - `--max-idle-ms MS`: give up after this long without data
//! - `--debug` / `--trace`: log verbosity
//!
//! Ctrl-C stops the run and reports the partial counters. The exit status
//! is zero only when every received packet was valid.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use log::{LevelFilter, Log, Metadata, Record, info};

use ph_axi_dma::{DmaMode, DmaSession, HardwareMap, SessionConfig, TransportKind};

// =============================================================================
// Logging
// =============================================================================

/// Minimal stderr backend for the `log` facade
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logger(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

// =============================================================================
// Signal Handling
// =============================================================================

/// Set by the SIGINT handler
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_sig: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

fn install_sigint_handler() {
    // SAFETY: the handler only stores to an atomic, which is
    // async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as *const () as libc::sighandler_t);
    }
}

// =============================================================================
// Command Line
// =============================================================================

struct Options {
    kind: TransportKind,
    dev_path: Option<PathBuf>,
    nr_pkts: u16,
    pkt_len: usize,
    pkt_pause: u16,
    hw_map: Option<PathBuf>,
    max_idle: Option<Duration>,
    log_level: LevelFilter,
}

impl Default for Options {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            kind: TransportKind::Uio,
            dev_path: None,
            nr_pkts: defaults.packet_count,
            pkt_len: defaults.packet_len,
            pkt_pause: defaults.packet_pause,
            hw_map: None,
            max_idle: None,
            log_level: LevelFilter::Info,
        }
    }
}

fn print_usage() {
    eprintln!(
        "Usage: axi-dma-demo [--mode uio|xdma] [--dev-path PATH] [--nr-pkts N]\n\
         \x20                   [--pkt-len BYTES] [--pkt-pause CYCLES] [--hw-map FILE]\n\
         \x20                   [--max-idle-ms MS] [--debug] [--trace]"
    );
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Option<Options>> {
    let mut opts = Options::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| iter.next().ok_or_else(|| anyhow!("{name} needs a value"));
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--mode" => {
                opts.kind = value("--mode")?
                    .parse()
                    .context("--mode must be uio or xdma")?;
            }
            "--dev-path" => opts.dev_path = Some(value("--dev-path")?.into()),
            "--nr-pkts" => opts.nr_pkts = value("--nr-pkts")?.parse().context("--nr-pkts")?,
            "--pkt-len" => opts.pkt_len = value("--pkt-len")?.parse().context("--pkt-len")?,
            "--pkt-pause" => {
                opts.pkt_pause = value("--pkt-pause")?.parse().context("--pkt-pause")?;
            }
            "--hw-map" => opts.hw_map = Some(value("--hw-map")?.into()),
            "--max-idle-ms" => {
                let ms: u64 = value("--max-idle-ms")?.parse().context("--max-idle-ms")?;
                opts.max_idle = Some(Duration::from_millis(ms));
            }
            "--debug" => opts.log_level = LevelFilter::Debug,
            "--trace" => opts.log_level = LevelFilter::Trace,
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(Some(opts))
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn run(opts: Options) -> anyhow::Result<bool> {
    let mode = DmaMode::new(opts.kind, opts.dev_path)?;
    let hw = match &opts.hw_map {
        Some(path) => HardwareMap::from_file(path)
            .with_context(|| format!("loading hardware map {}", path.display()))?,
        None => HardwareMap::default(),
    };

    let config = SessionConfig::new()
        .with_mode(mode)
        .with_packet_count(opts.nr_pkts)
        .with_packet_len(opts.pkt_len)
        .with_packet_pause(opts.pkt_pause)
        .with_max_idle(opts.max_idle);

    let mut session = DmaSession::open(config, &hw).context("opening DMA session")?;
    install_sigint_handler();
    let summary = session
        .run(|| INTERRUPTED.load(Ordering::SeqCst))
        .context("streaming run failed")?;

    info!("run ended: {:?}", summary.termination);
    println!(
        "Counters: OK = {}, total = {}",
        summary.packets_ok, summary.packets_total
    );
    Ok(summary.is_success())
}

fn main() -> ExitCode {
    let opts = match parse_args(std::env::args().skip(1)) {
        Ok(Some(opts)) => opts,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("axi-dma-demo: {err:#}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };
    init_logger(opts.log_level);

    match run(opts) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("axi-dma-demo: {err:#}");
            ExitCode::FAILURE
        }
    }
}
