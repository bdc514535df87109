pub mod collector;
pub mod platform;
pub mod system;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub use collector::Collector;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("command `{program}` is not available: {source}")]
    CommandUnavailable {
        program: String,
        source: std::io::Error,
    },
    #[error("command `{program}` exited with {status}")]
    CommandFailed { program: String, status: String },
    #[error("unexpected probe output: {0}")]
    Parse(String),
    #[error("not supported on this platform")]
    Unsupported,
    #[error("{0}")]
    Source(String),
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("hardware information is unavailable: {0}")]
    Unavailable(ProbeError),
}

pub type ProbeOutcome<T> = Result<T, ProbeError>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OsProbe {
    pub distro: Option<String>,
    pub release: Option<String>,
    pub arch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuProbe {
    pub brand: Option<String>,
    pub physical_cores: Option<u32>,
}

/// Raw byte counts are kept as floats so that broken sources (`NaN`,
/// negative, missing) reach the normalizer unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryProbe {
    pub total: Option<f64>,
    pub used: Option<f64>,
    pub free: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FsProbe {
    pub mount: String,
    pub fs_type: Option<String>,
    pub size: Option<f64>,
    pub used: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskLayoutProbe {
    pub device: String,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceProbe {
    pub iface: String,
    pub iface_name: Option<String>,
    /// `wireless`, `ethernet`, `loopback`, `bluetooth`, `virtual`...
    pub kind: Option<String>,
    pub mac: Option<String>,
    pub ip4: Option<String>,
    pub ip6: Option<String>,
    pub operstate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceStatsProbe {
    pub iface: String,
    pub rx_sec: Option<f64>,
    pub tx_sec: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThroughputProbe {
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphicsControllerProbe {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub vram_bytes: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayProbe {
    pub model: Option<String>,
    pub main: bool,
    pub resolution_x: Option<u32>,
    pub resolution_y: Option<u32>,
    pub pixel_depth: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphicsProbe {
    pub controllers: Vec<GraphicsControllerProbe>,
    pub displays: Vec<DisplayProbe>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryProbe {
    pub percent: Option<f64>,
    pub charging: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiosProbe {
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemperatureProbe {
    /// `-1.0` is the "no reading" value some sources report.
    pub main: Option<f64>,
    pub cores: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityProbe {
    pub firewall_enabled: Option<bool>,
    pub firewall_profile: Option<String>,
    pub antivirus: Vec<String>,
}

/// Everything one collection cycle gathered, each slot resolved on its own.
#[derive(Debug)]
pub struct RawProbes {
    pub collected_at_unix: i64,
    pub os: ProbeOutcome<OsProbe>,
    pub hostname: ProbeOutcome<String>,
    pub cpu: ProbeOutcome<CpuProbe>,
    pub cpu_load: ProbeOutcome<f64>,
    pub memory: ProbeOutcome<MemoryProbe>,
    pub file_systems: ProbeOutcome<Vec<FsProbe>>,
    pub disk_layout: ProbeOutcome<Vec<DiskLayoutProbe>>,
    pub interfaces: ProbeOutcome<Vec<InterfaceProbe>>,
    pub interface_stats: ProbeOutcome<Vec<InterfaceStatsProbe>>,
    pub fallback_throughput: HashMap<String, ThroughputProbe>,
    pub wifi_ssid: Option<String>,
    pub graphics: ProbeOutcome<GraphicsProbe>,
    pub battery: ProbeOutcome<Option<BatteryProbe>>,
    pub power_plan: Option<String>,
    pub uptime: ProbeOutcome<u64>,
    pub bios: ProbeOutcome<BiosProbe>,
    pub temperature: ProbeOutcome<TemperatureProbe>,
    pub security: ProbeOutcome<SecurityProbe>,
}

/// Source of hardware and OS telemetry. Every query may fail on its own.
#[async_trait]
pub trait HardwareProvider: Send + Sync {
    /// Checked once per cycle before any probe runs.
    async fn ensure_available(&self) -> Result<(), ProbeError> {
        Ok(())
    }
    async fn os_info(&self) -> ProbeOutcome<OsProbe>;
    async fn hostname(&self) -> ProbeOutcome<String>;
    async fn cpu(&self) -> ProbeOutcome<CpuProbe>;
    async fn cpu_load(&self) -> ProbeOutcome<f64>;
    async fn memory(&self) -> ProbeOutcome<MemoryProbe>;
    async fn file_systems(&self) -> ProbeOutcome<Vec<FsProbe>>;
    async fn disk_layout(&self) -> ProbeOutcome<Vec<DiskLayoutProbe>>;
    async fn network_interfaces(&self) -> ProbeOutcome<Vec<InterfaceProbe>>;
    async fn network_stats(&self) -> ProbeOutcome<Vec<InterfaceStatsProbe>>;
    async fn graphics(&self) -> ProbeOutcome<GraphicsProbe>;
    /// `Ok(None)` means the machine has no battery.
    async fn battery(&self) -> ProbeOutcome<Option<BatteryProbe>>;
    async fn uptime(&self) -> ProbeOutcome<u64>;
    async fn bios(&self) -> ProbeOutcome<BiosProbe>;
    async fn temperature(&self) -> ProbeOutcome<TemperatureProbe>;
}

/// OS-native commands that only some platforms have.
#[async_trait]
pub trait PlatformQuery: Send + Sync {
    async fn wifi_ssid(&self) -> ProbeOutcome<Option<String>>;
    async fn adapter_throughput(&self, iface: &str) -> ProbeOutcome<ThroughputProbe>;
    async fn power_plan(&self) -> ProbeOutcome<Option<String>>;
    async fn security(&self) -> ProbeOutcome<SecurityProbe>;
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
