use serde::{Serialize, Serializer};
use std::fmt;

pub const NOT_AVAILABLE: &str = "N/A";
pub const UNKNOWN: &str = "Unknown";

/// One normalized view of the machine, produced once per collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub collected_at_unix: i64,
    pub platform: PlatformInfo,
    pub hostname: String,
    pub uptime_seconds: u64,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disks: Vec<DiskInfo>,
    pub network: NetworkInfo,
    pub graphics: Vec<GraphicsInfo>,
    pub battery: Option<BatteryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<AdditionalInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub distro: String,
    pub release: String,
    pub arch: String,
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.distro, self.release, self.arch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    pub model: String,
    pub core_count: CoreCount,
    pub current_load_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreCount {
    Known(u32),
    NotAvailable,
}

impl Serialize for CoreCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(n) => serializer.serialize_u32(*n),
            Self::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl fmt::Display for CoreCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(n) => write!(f, "{n}"),
            Self::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    pub mount: String,
    #[serde(rename = "type")]
    pub fs_type: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub adapters: Vec<NetworkAdapter>,
    pub connected_adapter: Option<NetworkAdapter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAdapter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AdapterKind,
    pub ip: String,
    pub mac: String,
    pub wifi_network_name: String,
    pub status: AdapterStatus,
    pub throughput: Throughput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdapterKind {
    Wireless,
    Ethernet,
    Unknown,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wireless => "WIRELESS",
            Self::Ethernet => "ETHERNET",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterStatus {
    pub operational_state: String,
    pub carrier: Carrier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Carrier {
    Connected,
    Disconnected,
    Error,
    Unknown,
}

impl Carrier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Error => "Error",
            Self::Unknown => "Unknown",
        }
    }
}

/// Formatted link throughput, `"X.XX Mbps"` or `"N/A"` when nothing measured it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Throughput {
    pub upload: String,
    pub download: String,
}

impl Throughput {
    pub fn not_available() -> Self {
        Self {
            upload: NOT_AVAILABLE.to_string(),
            download: NOT_AVAILABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphicsInfo {
    pub vendor: String,
    pub model: String,
    #[serde(rename = "vramMB")]
    pub vram_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryInfo {
    pub percentage: String,
    pub charging: Charging,
    pub power_plan: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charging {
    Known(bool),
    Unknown,
}

impl Serialize for Charging {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => serializer.serialize_bool(*v),
            Self::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

impl fmt::Display for Charging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(true) => f.write_str("Yes"),
            Self::Known(false) => f.write_str("No"),
            Self::Unknown => f.write_str(UNKNOWN),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bios: Option<BiosInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperatures: Option<TemperatureInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<Vec<DisplayInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityInfo>,
}

impl AdditionalInfo {
    pub fn is_empty(&self) -> bool {
        self.bios.is_none()
            && self.temperatures.is_none()
            && self.display.is_none()
            && self.security.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BiosInfo {
    pub vendor: String,
    pub version: String,
    pub release_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureInfo {
    #[serde(rename = "cpuC")]
    pub cpu_c: String,
    #[serde(rename = "coresC")]
    pub cores_c: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub model: String,
    pub is_main: bool,
    pub resolution: String,
    pub pixel_depth: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityInfo {
    pub firewall: String,
    pub antivirus: String,
}

/// Threshold bands used by the widget's progress bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl Severity {
    pub fn from_percent(percent: f64) -> Self {
        if !percent.is_finite() || percent < 50.0 {
            Self::Ok
        } else if percent < 70.0 {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauge {
    pub percent: f64,
    pub severity: Severity,
    pub text: String,
}

/// The three bars the widget shows: first disk, memory and CPU.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gauges {
    pub collected_at_unix: i64,
    pub disk: Gauge,
    pub memory: Gauge,
    pub cpu: Gauge,
}

impl Gauges {
    pub fn from_snapshot(snapshot: &SystemSnapshot) -> Self {
        let disk = match snapshot.disks.first() {
            Some(d) => Gauge {
                percent: d.usage_percent,
                severity: Severity::from_percent(d.usage_percent),
                text: format!(
                    "{:.0}% ({:.2}GB / {:.2}GB)",
                    d.usage_percent,
                    bytes_to_gb(d.used_bytes),
                    bytes_to_gb(d.total_bytes)
                ),
            },
            None => Gauge {
                percent: 0.0,
                severity: Severity::Ok,
                text: NOT_AVAILABLE.to_string(),
            },
        };
        let mem = &snapshot.memory;
        let memory = Gauge {
            percent: mem.usage_percent,
            severity: Severity::from_percent(mem.usage_percent),
            text: format!(
                "{:.0}% ({:.2}GB / {:.2}GB)",
                mem.usage_percent,
                bytes_to_gb(mem.used_bytes),
                bytes_to_gb(mem.total_bytes)
            ),
        };
        let load = snapshot.cpu.current_load_percent;
        let cpu = Gauge {
            percent: load,
            severity: Severity::from_percent(load),
            text: format!("{load:.0}%"),
        };

        Self {
            collected_at_unix: snapshot.collected_at_unix,
            disk,
            memory,
            cpu,
        }
    }
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0 / 1024.0
}
