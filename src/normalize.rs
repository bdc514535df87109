//! Raw probe results to display-ready snapshot fields.
//!
//! Fallbacks live in the policy tables below; the `normalize_*` functions
//! only decide which raw value feeds which policy.

use crate::collectors::{
    BatteryProbe, BiosProbe, CpuProbe, DiskLayoutProbe, FsProbe, GraphicsProbe, InterfaceProbe,
    InterfaceStatsProbe, MemoryProbe, OsProbe, ProbeOutcome, RawProbes, SecurityProbe,
    TemperatureProbe, ThroughputProbe,
};
use crate::snapshot::{
    AdapterKind, AdapterStatus, AdditionalInfo, BatteryInfo, BiosInfo, Carrier, Charging,
    CoreCount, CpuInfo, DiskInfo, DisplayInfo, GraphicsInfo, MemoryInfo, NetworkAdapter,
    NetworkInfo, PlatformInfo, SecurityInfo, SystemSnapshot, TemperatureInfo, Throughput,
    NOT_AVAILABLE, UNKNOWN,
};
use std::collections::HashMap;
use tracing::debug;

pub const NO_ADAPTERS_NAME: &str = "No Meaningful Network Adapters";
pub const DETECTION_FAILED_NAME: &str = "Network Detection Failed";

const EXCLUDED_NAME_MARKERS: [&str; 4] = ["loopback", "pseudo", "bluetooth", "virtual"];
const MAC_HEADER_TOKENS: [&str; 4] = ["name", "macaddress", "status", "linkspeed"];
const ZERO_MAC: &str = "00:00:00:00:00:00";
const TEMPERATURE_SENTINEL: f64 = -1.0;

/// Fallback rule for one text field: blank or missing values become `fallback`.
#[derive(Debug, Clone, Copy)]
pub struct TextPolicy {
    pub field: &'static str,
    pub fallback: &'static str,
}

impl TextPolicy {
    pub fn resolve(&self, value: Option<&str>) -> String {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => v.to_string(),
            None => {
                debug!(field = self.field, fallback = self.fallback, "text field fell back");
                self.fallback.to_string()
            }
        }
    }
}

/// Fallback rule for one numeric field: values rejected by `accept` become `fallback`.
#[derive(Debug, Clone, Copy)]
pub struct NumberPolicy {
    pub field: &'static str,
    pub accept: fn(f64) -> bool,
    pub fallback: f64,
}

impl NumberPolicy {
    pub fn accepted(&self, value: Option<f64>) -> Option<f64> {
        value.filter(|v| (self.accept)(*v))
    }

    pub fn resolve(&self, value: Option<f64>) -> f64 {
        self.accepted(value).unwrap_or_else(|| {
            debug!(field = self.field, raw = ?value, fallback = self.fallback, "numeric field fell back");
            self.fallback
        })
    }
}

fn finite_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn real_temperature(v: f64) -> bool {
    v.is_finite() && v != TEMPERATURE_SENTINEL
}

fn battery_level(v: f64) -> bool {
    v.is_finite() && (0.0..=100.0).contains(&v)
}

pub const OS_DISTRO: TextPolicy = TextPolicy { field: "platform.distro", fallback: UNKNOWN };
pub const OS_RELEASE: TextPolicy = TextPolicy { field: "platform.release", fallback: UNKNOWN };
pub const OS_ARCH: TextPolicy = TextPolicy { field: "platform.arch", fallback: UNKNOWN };
pub const HOSTNAME: TextPolicy = TextPolicy { field: "hostname", fallback: UNKNOWN };
pub const CPU_MODEL: TextPolicy = TextPolicy { field: "cpu.model", fallback: UNKNOWN };
pub const DISK_TYPE: TextPolicy = TextPolicy { field: "disks.type", fallback: UNKNOWN };
pub const ADAPTER_NAME: TextPolicy = TextPolicy { field: "adapter.name", fallback: "Unknown Interface" };
pub const ADAPTER_IP: TextPolicy = TextPolicy { field: "adapter.ip", fallback: NOT_AVAILABLE };
pub const ADAPTER_MAC: TextPolicy = TextPolicy { field: "adapter.mac", fallback: NOT_AVAILABLE };
pub const ADAPTER_STATE: TextPolicy = TextPolicy { field: "adapter.operationalState", fallback: UNKNOWN };
pub const WIFI_NAME: TextPolicy = TextPolicy { field: "adapter.wifiNetworkName", fallback: NOT_AVAILABLE };
pub const GPU_VENDOR: TextPolicy = TextPolicy { field: "graphics.vendor", fallback: UNKNOWN };
pub const GPU_MODEL: TextPolicy = TextPolicy { field: "graphics.model", fallback: UNKNOWN };
pub const POWER_PLAN: TextPolicy = TextPolicy { field: "battery.powerPlan", fallback: UNKNOWN };
pub const BIOS_VENDOR: TextPolicy = TextPolicy { field: "bios.vendor", fallback: NOT_AVAILABLE };
pub const BIOS_VERSION: TextPolicy = TextPolicy { field: "bios.version", fallback: NOT_AVAILABLE };
pub const BIOS_DATE: TextPolicy = TextPolicy { field: "bios.releaseDate", fallback: NOT_AVAILABLE };
pub const DISPLAY_MODEL: TextPolicy = TextPolicy { field: "display.model", fallback: UNKNOWN };

pub const BYTES: NumberPolicy = NumberPolicy { field: "bytes", accept: finite_non_negative, fallback: 0.0 };
pub const CPU_LOAD: NumberPolicy = NumberPolicy { field: "cpu.currentLoadPercent", accept: finite_non_negative, fallback: 0.0 };
pub const RATE: NumberPolicy = NumberPolicy { field: "adapter.throughput", accept: finite_non_negative, fallback: 0.0 };
pub const TEMPERATURE: NumberPolicy = NumberPolicy { field: "temperatures", accept: real_temperature, fallback: TEMPERATURE_SENTINEL };
pub const BATTERY_LEVEL: NumberPolicy = NumberPolicy { field: "battery.percentage", accept: battery_level, fallback: -1.0 };

pub fn normalize(raw: &RawProbes) -> SystemSnapshot {
    SystemSnapshot {
        collected_at_unix: raw.collected_at_unix,
        platform: normalize_platform(&raw.os),
        hostname: HOSTNAME.resolve(raw.hostname.as_ref().ok().map(String::as_str)),
        uptime_seconds: raw.uptime.as_ref().copied().unwrap_or(0),
        cpu: normalize_cpu(&raw.cpu, &raw.cpu_load),
        memory: normalize_memory(&raw.memory),
        disks: normalize_disks(&raw.file_systems, &raw.disk_layout),
        network: normalize_network(
            &raw.interfaces,
            &raw.interface_stats,
            &raw.fallback_throughput,
            raw.wifi_ssid.as_deref(),
        ),
        graphics: normalize_graphics(&raw.graphics),
        battery: normalize_battery(&raw.battery, raw.power_plan.as_deref()),
        additional_info: normalize_additional(
            &raw.bios,
            &raw.temperature,
            &raw.graphics,
            &raw.security,
        ),
    }
}

/// `part / whole` as a percentage in `[0, 100]`, two decimals, 0 for any
/// non-finite or zero-sized input.
pub fn ratio_percent(part: f64, whole: f64) -> f64 {
    if !part.is_finite() || !whole.is_finite() || whole <= 0.0 {
        return 0.0;
    }
    round2((part / whole * 100.0).clamp(0.0, 100.0))
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn normalize_platform(os: &ProbeOutcome<OsProbe>) -> PlatformInfo {
    let os = os.as_ref().ok();
    PlatformInfo {
        distro: OS_DISTRO.resolve(os.and_then(|o| o.distro.as_deref())),
        release: OS_RELEASE.resolve(os.and_then(|o| o.release.as_deref())),
        arch: OS_ARCH.resolve(os.and_then(|o| o.arch.as_deref())),
    }
}

fn normalize_cpu(cpu: &ProbeOutcome<CpuProbe>, load: &ProbeOutcome<f64>) -> CpuInfo {
    let cpu = cpu.as_ref().ok();
    let core_count = cpu
        .and_then(|c| c.physical_cores)
        .filter(|n| *n > 0)
        .map(CoreCount::Known)
        .unwrap_or(CoreCount::NotAvailable);
    let load = CPU_LOAD.resolve(load.as_ref().ok().copied());

    CpuInfo {
        model: CPU_MODEL.resolve(cpu.and_then(|c| c.brand.as_deref())),
        core_count,
        current_load_percent: round2(load.min(100.0)),
    }
}

pub fn normalize_memory(memory: &ProbeOutcome<MemoryProbe>) -> MemoryInfo {
    let Ok(m) = memory else {
        return MemoryInfo {
            total_bytes: 0,
            used_bytes: 0,
            free_bytes: 0,
            usage_percent: 0.0,
        };
    };

    match (BYTES.accepted(m.total), BYTES.accepted(m.used)) {
        (Some(total), Some(used)) => {
            let free = BYTES
                .accepted(m.free)
                .unwrap_or_else(|| (total - used).max(0.0));
            MemoryInfo {
                total_bytes: total as u64,
                used_bytes: used as u64,
                free_bytes: free as u64,
                usage_percent: ratio_percent(used, total),
            }
        }
        (total, used) => MemoryInfo {
            total_bytes: total.unwrap_or(0.0) as u64,
            used_bytes: used.unwrap_or(0.0) as u64,
            free_bytes: BYTES.resolve(m.free) as u64,
            usage_percent: 0.0,
        },
    }
}

pub fn normalize_disks(
    file_systems: &ProbeOutcome<Vec<FsProbe>>,
    layout: &ProbeOutcome<Vec<DiskLayoutProbe>>,
) -> Vec<DiskInfo> {
    let Ok(file_systems) = file_systems else {
        return Vec::new();
    };
    let layout: &[DiskLayoutProbe] = layout.as_ref().map(Vec::as_slice).unwrap_or(&[]);

    file_systems
        .iter()
        .map(|fs| {
            let layout_type = layout_type_for_mount(&fs.mount, layout);
            let fs_type = fs
                .fs_type
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .or(layout_type);

            let (total_bytes, used_bytes, free_bytes, usage_percent) =
                match (BYTES.accepted(fs.size), BYTES.accepted(fs.used)) {
                    (Some(total), Some(used)) => (
                        total as u64,
                        used as u64,
                        (total as u64).saturating_sub(used as u64),
                        ratio_percent(used, total),
                    ),
                    _ => (0, 0, 0, 0.0),
                };

            DiskInfo {
                mount: fs.mount.clone(),
                fs_type: DISK_TYPE.resolve(fs_type),
                total_bytes,
                used_bytes,
                free_bytes,
                usage_percent,
            }
        })
        .collect()
}

fn layout_type_for_mount<'a>(mount: &str, layout: &'a [DiskLayoutProbe]) -> Option<&'a str> {
    let mount = mount.to_lowercase();
    layout
        .iter()
        .filter(|d| !d.device.trim().is_empty())
        .find(|d| mount.contains(&d.device.to_lowercase()))
        .and_then(|d| d.kind.as_deref())
        .filter(|k| !k.trim().is_empty())
}

/// Whether an interface is a real wired or wireless adapter worth showing.
pub fn is_meaningful_interface(iface: &InterfaceProbe) -> bool {
    if !matches!(
        classify(iface.kind.as_deref()),
        AdapterKind::Wireless | AdapterKind::Ethernet
    ) {
        return false;
    }

    let names = [Some(iface.iface.as_str()), iface.iface_name.as_deref()];
    let excluded_by_name = names.iter().flatten().any(|name| {
        let lower = name.to_lowercase();
        EXCLUDED_NAME_MARKERS.iter().any(|m| lower.contains(m))
    });
    if excluded_by_name {
        return false;
    }

    let Some(mac) = iface.mac.as_deref().map(str::trim) else {
        return false;
    };
    if mac.is_empty() {
        return false;
    }
    let mac_lower = mac.to_lowercase().replace('-', ":");
    if mac_lower == ZERO_MAC {
        return false;
    }
    !MAC_HEADER_TOKENS.iter().any(|t| mac_lower.contains(t))
}

fn classify(kind: Option<&str>) -> AdapterKind {
    match kind.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        Some("wireless") => AdapterKind::Wireless,
        Some("ethernet") | Some("wired") => AdapterKind::Ethernet,
        _ => AdapterKind::Unknown,
    }
}

fn carrier_for(operstate: Option<&str>) -> Carrier {
    match operstate.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("up") => Carrier::Connected,
        None | Some("") | Some("unknown") => Carrier::Unknown,
        Some(_) => Carrier::Disconnected,
    }
}

pub fn format_mbps(bytes_per_sec: f64) -> String {
    format!("{:.2} Mbps", bytes_per_sec * 8.0 / 1_000_000.0)
}

fn sentinel_adapter(name: &str, carrier: Carrier) -> NetworkAdapter {
    NetworkAdapter {
        name: name.to_string(),
        kind: AdapterKind::Unknown,
        ip: NOT_AVAILABLE.to_string(),
        mac: NOT_AVAILABLE.to_string(),
        wifi_network_name: NOT_AVAILABLE.to_string(),
        status: AdapterStatus {
            operational_state: UNKNOWN.to_string(),
            carrier,
        },
        throughput: Throughput::not_available(),
    }
}

pub fn normalize_network(
    interfaces: &ProbeOutcome<Vec<InterfaceProbe>>,
    stats: &ProbeOutcome<Vec<InterfaceStatsProbe>>,
    fallback: &HashMap<String, ThroughputProbe>,
    wifi_ssid: Option<&str>,
) -> NetworkInfo {
    let Ok(interfaces) = interfaces else {
        return NetworkInfo {
            adapters: vec![sentinel_adapter(DETECTION_FAILED_NAME, Carrier::Error)],
            connected_adapter: None,
        };
    };
    let stats: &[InterfaceStatsProbe] = stats.as_ref().map(Vec::as_slice).unwrap_or(&[]);

    let retained: Vec<NetworkAdapter> = interfaces
        .iter()
        .filter(|i| is_meaningful_interface(i))
        .map(|i| {
            let kind = classify(i.kind.as_deref());
            let stat = stats.iter().find(|s| s.iface == i.iface);
            let backup = fallback.get(&i.iface);
            let upload = RATE
                .accepted(stat.and_then(|s| s.tx_sec))
                .or(backup.map(|b| b.tx_bytes_per_sec).filter(|v| finite_non_negative(*v)));
            let download = RATE
                .accepted(stat.and_then(|s| s.rx_sec))
                .or(backup.map(|b| b.rx_bytes_per_sec).filter(|v| finite_non_negative(*v)));

            NetworkAdapter {
                name: ADAPTER_NAME.resolve(
                    i.iface_name
                        .as_deref()
                        .filter(|n| !n.trim().is_empty())
                        .or(Some(i.iface.as_str())),
                ),
                kind,
                ip: ADAPTER_IP.resolve(
                    i.ip4
                        .as_deref()
                        .filter(|v| !v.trim().is_empty())
                        .or(i.ip6.as_deref()),
                ),
                mac: ADAPTER_MAC.resolve(i.mac.as_deref()),
                wifi_network_name: if kind == AdapterKind::Wireless {
                    WIFI_NAME.resolve(wifi_ssid)
                } else {
                    NOT_AVAILABLE.to_string()
                },
                status: AdapterStatus {
                    operational_state: ADAPTER_STATE.resolve(i.operstate.as_deref()),
                    carrier: carrier_for(i.operstate.as_deref()),
                },
                throughput: Throughput {
                    upload: upload.map(format_mbps).unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                    download: download
                        .map(format_mbps)
                        .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                },
            }
        })
        .collect();

    let connected_adapter = retained
        .iter()
        .find(|a| a.status.carrier == Carrier::Connected)
        .cloned();
    let adapters = if retained.is_empty() {
        vec![sentinel_adapter(NO_ADAPTERS_NAME, Carrier::Disconnected)]
    } else {
        retained
    };

    NetworkInfo {
        adapters,
        connected_adapter,
    }
}

fn normalize_graphics(graphics: &ProbeOutcome<GraphicsProbe>) -> Vec<GraphicsInfo> {
    let Ok(graphics) = graphics else {
        return Vec::new();
    };
    graphics
        .controllers
        .iter()
        .map(|g| GraphicsInfo {
            vendor: GPU_VENDOR.resolve(g.vendor.as_deref()),
            model: GPU_MODEL.resolve(g.model.as_deref()),
            vram_mb: round2(BYTES.resolve(g.vram_bytes) / (1024.0 * 1024.0)),
        })
        .collect()
}

fn normalize_battery(
    battery: &ProbeOutcome<Option<BatteryProbe>>,
    power_plan: Option<&str>,
) -> Option<BatteryInfo> {
    match battery {
        Ok(None) => None,
        Ok(Some(b)) => Some(BatteryInfo {
            percentage: BATTERY_LEVEL
                .accepted(b.percent)
                .map(|p| format!("{p:.0}%"))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            charging: b.charging.map(Charging::Known).unwrap_or(Charging::Unknown),
            power_plan: POWER_PLAN.resolve(power_plan),
        }),
        Err(_) => Some(BatteryInfo {
            percentage: NOT_AVAILABLE.to_string(),
            charging: Charging::Unknown,
            power_plan: POWER_PLAN.resolve(None),
        }),
    }
}

fn normalize_additional(
    bios: &ProbeOutcome<BiosProbe>,
    temperature: &ProbeOutcome<TemperatureProbe>,
    graphics: &ProbeOutcome<GraphicsProbe>,
    security: &ProbeOutcome<SecurityProbe>,
) -> Option<AdditionalInfo> {
    let info = AdditionalInfo {
        bios: bios.as_ref().ok().and_then(bios_section),
        temperatures: temperature.as_ref().ok().and_then(temperature_section),
        display: graphics.as_ref().ok().and_then(display_section),
        security: security.as_ref().ok().and_then(security_section),
    };
    (!info.is_empty()).then_some(info)
}

fn has_text(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn bios_section(bios: &BiosProbe) -> Option<BiosInfo> {
    if !(has_text(&bios.vendor) || has_text(&bios.version) || has_text(&bios.release_date)) {
        return None;
    }
    Some(BiosInfo {
        vendor: BIOS_VENDOR.resolve(bios.vendor.as_deref()),
        version: BIOS_VERSION.resolve(bios.version.as_deref()),
        release_date: BIOS_DATE.resolve(bios.release_date.as_deref()),
    })
}

fn format_celsius(v: f64) -> String {
    format!("{v:.1}°C")
}

fn temperature_section(t: &TemperatureProbe) -> Option<TemperatureInfo> {
    let main = TEMPERATURE.accepted(t.main);
    if main.is_none() && t.cores.is_empty() {
        return None;
    }
    let cores_c = if t.cores.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        t.cores
            .iter()
            .map(|c| {
                if c.is_finite() {
                    format_celsius(*c)
                } else {
                    NOT_AVAILABLE.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    Some(TemperatureInfo {
        cpu_c: main
            .map(format_celsius)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        cores_c,
    })
}

fn display_section(graphics: &GraphicsProbe) -> Option<Vec<DisplayInfo>> {
    let displays: Vec<DisplayInfo> = graphics
        .displays
        .iter()
        .filter(|d| has_text(&d.model) || d.resolution_x.is_some() || d.resolution_y.is_some())
        .map(|d| DisplayInfo {
            model: DISPLAY_MODEL.resolve(d.model.as_deref()),
            is_main: d.main,
            resolution: format!(
                "{}x{}",
                d.resolution_x.unwrap_or(0),
                d.resolution_y.unwrap_or(0)
            ),
            pixel_depth: d.pixel_depth,
        })
        .collect();
    (!displays.is_empty()).then_some(displays)
}

fn security_section(s: &SecurityProbe) -> Option<SecurityInfo> {
    if s.firewall_enabled.is_none() && s.antivirus.is_empty() {
        return None;
    }
    let firewall = match (s.firewall_enabled, s.firewall_profile.as_deref()) {
        (Some(true), Some(profile)) => format!("ON ({profile})"),
        (Some(true), None) => "ON".to_string(),
        (Some(false), Some(profile)) => format!("OFF ({profile})"),
        (Some(false), None) => "OFF".to_string(),
        (None, _) => NOT_AVAILABLE.to_string(),
    };
    let antivirus = if s.antivirus.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        s.antivirus.join(", ")
    };
    Some(SecurityInfo {
        firewall,
        antivirus,
    })
}
