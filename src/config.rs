//! Session and hardware configuration
//!
//! - [`SessionConfig`]: what one run does (transport, packets, ring geometry,
//!   polling)
//! - [`HardwareMap`]: where the FPGA blocks live, per transport; built-in
//!   defaults can be overridden from a TOML file

use std::path::Path;
use std::time::Duration;

use log::error;
use toml::{Table, Value};

use crate::constants::{
    DEFAULT_ENTRY_LEN, DEFAULT_PACKET_COUNT, DEFAULT_PACKET_LEN, DEFAULT_PACKET_PAUSE,
    DEFAULT_POLL_INTERVAL, DEFAULT_RING_ENTRIES, LFSR_BYTES_PER_BEAT, MAX_BEATS_PER_PACKET,
    MAX_DESCRIPTOR_BUFFER_LEN,
};
use crate::error::{ConfigError, ConfigResult, ResourceError, Result};
use crate::region::PhysicalRegion;
use crate::register::{DmaMode, RegisterTarget};

// =============================================================================
// Session Configuration
// =============================================================================

/// Settings of one streaming run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Transport for registers and buffer
    pub mode: DmaMode,
    /// Packets requested from the traffic generator
    pub packet_count: u16,
    /// Packet length in bytes (multiple of the 16-byte beat)
    pub packet_len: usize,
    /// Generator pause between packets, in clock cycles
    pub packet_pause: u16,
    /// Descriptors in the cyclic ring
    pub ring_entries: usize,
    /// Destination bytes per descriptor
    pub entry_len: usize,
    /// Handler poll interval and supervisor wait step
    pub poll_interval: Duration,
    /// Give up after this long without data
    pub max_idle: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: DmaMode::default(),
            packet_count: DEFAULT_PACKET_COUNT,
            packet_len: DEFAULT_PACKET_LEN,
            packet_pause: DEFAULT_PACKET_PAUSE,
            ring_entries: DEFAULT_RING_ENTRIES,
            entry_len: DEFAULT_ENTRY_LEN,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_idle: None,
        }
    }
}

impl SessionConfig {
    /// Create configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transport
    #[must_use]
    pub fn with_mode(mut self, mode: DmaMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the number of packets
    #[must_use]
    pub fn with_packet_count(mut self, count: u16) -> Self {
        self.packet_count = count;
        self
    }

    /// Set the packet length in bytes
    #[must_use]
    pub fn with_packet_len(mut self, len: usize) -> Self {
        self.packet_len = len;
        self
    }

    /// Set the inter-packet pause
    #[must_use]
    pub fn with_packet_pause(mut self, pause: u16) -> Self {
        self.packet_pause = pause;
        self
    }

    /// Set the ring geometry
    #[must_use]
    pub fn with_ring(mut self, entries: usize, entry_len: usize) -> Self {
        self.ring_entries = entries;
        self.entry_len = entry_len;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the idle limit
    #[must_use]
    pub fn with_max_idle(mut self, limit: Option<Duration>) -> Self {
        self.max_idle = limit;
        self
    }

    /// Bytes the run is expected to deliver
    #[must_use]
    pub const fn target_bytes(&self) -> usize {
        self.packet_count as usize * self.packet_len
    }

    /// Bytes covered by the ring
    #[must_use]
    pub const fn ring_bytes(&self) -> usize {
        self.ring_entries * self.entry_len
    }

    /// Check the settings for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if self.packet_count == 0 {
            return Err(ConfigError::InvalidConfig("packet count must not be zero"));
        }
        if self.packet_len == 0 || self.packet_len % LFSR_BYTES_PER_BEAT != 0 {
            return Err(ConfigError::InvalidConfig(
                "packet length must be a multiple of 16 bytes",
            ));
        }
        if self.packet_len / LFSR_BYTES_PER_BEAT > MAX_BEATS_PER_PACKET {
            return Err(ConfigError::InvalidConfig("packet length too large"));
        }
        if self.ring_entries == 0 {
            return Err(ConfigError::InvalidConfig("ring needs at least one descriptor"));
        }
        if self.entry_len == 0 || self.entry_len > MAX_DESCRIPTOR_BUFFER_LEN {
            return Err(ConfigError::InvalidConfig("ring entry length out of range"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidConfig("poll interval must not be zero"));
        }
        if let DmaMode::Xdma { dev_path } = &self.mode
            && dev_path.as_os_str().is_empty()
        {
            return Err(ConfigError::MissingDevicePath);
        }
        Ok(())
    }
}

// =============================================================================
// Hardware Map
// =============================================================================

/// Placement of the FPGA design's blocks
///
/// Every field has a default matching the reference design; a TOML file
/// only needs the keys that differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareMap {
    /// Status GPIO (calibration flag)
    pub gpio_status: RegisterTarget,
    /// AXI DMA engine
    pub axi_dma: RegisterTarget,
    /// Descriptor memory
    pub desc_bram: RegisterTarget,
    /// AXI Traffic Generator
    pub traffic_gen: RegisterTarget,
    /// Bus address at which the XDMA `user` node starts
    pub pcie_axi4l_offset: u64,
    /// FPGA memory used as DMA target in XDMA mode
    pub fpga_mem: PhysicalRegion,
    /// u-dma-buf instance used in UIO mode
    pub udmabuf_index: u32,
}

impl Default for HardwareMap {
    fn default() -> Self {
        Self {
            gpio_status: RegisterTarget::new(
                "axi_gpio_status",
                PhysicalRegion::new(0x8001_0000, 0x1000),
            ),
            axi_dma: RegisterTarget::new(
                "hier_daq_arm_axi_dma_0",
                PhysicalRegion::new(0x8000_0000, 0x1000),
            ),
            desc_bram: RegisterTarget::new(
                "hier_daq_arm_axi_bram_ctrl_0",
                PhysicalRegion::new(0x8010_0000, 0x2000),
            ),
            traffic_gen: RegisterTarget::new(
                "hier_daq_arm_axi_traffic_gen_0",
                PhysicalRegion::new(0x8002_0000, 0x1000),
            ),
            pcie_axi4l_offset: 0x8000_0000,
            fpga_mem: PhysicalRegion::new(0x4_0000_0000, 0x1000_0000),
            udmabuf_index: 0,
        }
    }
}

impl HardwareMap {
    /// Parse a TOML description; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let doc: Table = text.parse().map_err(|e: toml::de::Error| {
            error!("hardware map: {e}");
            ConfigError::InvalidConfig("malformed hardware map")
        })?;

        let mut map = Self::default();
        for (key, value) in &doc {
            match key.as_str() {
                "gpio_status" => apply_target(&mut map.gpio_status, value)?,
                "axi_dma" => apply_target(&mut map.axi_dma, value)?,
                "desc_bram" => apply_target(&mut map.desc_bram, value)?,
                "traffic_gen" => apply_target(&mut map.traffic_gen, value)?,
                "pcie_axi4l_offset" => map.pcie_axi4l_offset = integer(key, value)?,
                "fpga_mem" => apply_region(&mut map.fpga_mem, value)?,
                "udmabuf_index" => {
                    map.udmabuf_index = u32::try_from(integer(key, value)?)
                        .map_err(|_| ConfigError::InvalidConfig("udmabuf index out of range"))?;
                }
                other => return Err(unknown_key(other)),
            }
        }
        Ok(map)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ResourceError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml_str(&text)?)
    }
}

fn integer(key: &str, value: &Value) -> ConfigResult<u64> {
    value
        .as_integer()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| {
            error!("hardware map: {key} must be a non-negative integer");
            ConfigError::InvalidConfig("malformed hardware map")
        })
}

fn table<'a>(key: &str, value: &'a Value) -> ConfigResult<&'a Table> {
    value.as_table().ok_or_else(|| {
        error!("hardware map: {key} must be a table");
        ConfigError::InvalidConfig("malformed hardware map")
    })
}

fn unknown_key(key: &str) -> ConfigError {
    error!("hardware map: unknown key {key:?}");
    ConfigError::InvalidConfig("unknown hardware map key")
}

fn apply_region(region: &mut PhysicalRegion, value: &Value) -> ConfigResult<()> {
    for (key, value) in table("window", value)? {
        match key.as_str() {
            "addr" => region.addr = integer(key, value)?,
            "size" => {
                region.size = usize::try_from(integer(key, value)?)
                    .map_err(|_| ConfigError::InvalidConfig("window size out of range"))?;
            }
            other => return Err(unknown_key(other)),
        }
    }
    Ok(())
}

fn apply_target(target: &mut RegisterTarget, value: &Value) -> ConfigResult<()> {
    for (key, value) in table("register target", value)? {
        match key.as_str() {
            "uio_name" => {
                target.uio_name = value
                    .as_str()
                    .ok_or_else(|| {
                        error!("hardware map: uio_name must be a string");
                        ConfigError::InvalidConfig("malformed hardware map")
                    })?
                    .to_string();
            }
            "window" => apply_region(&mut target.window, value)?,
            other => return Err(unknown_key(other)),
        }
    }
    Ok(())
}
