use crate::collectors::platform::{
    parse_f64_loose, parse_ip_addr, parse_lspci_graphics, parse_xrandr, run_powershell,
    split_pipe_row, AddressSet, CommandRunner, HostOs,
};
use crate::collectors::{
    BatteryProbe, BiosProbe, CpuProbe, DiskLayoutProbe, DisplayProbe, FsProbe,
    GraphicsControllerProbe, GraphicsProbe, HardwareProvider, InterfaceProbe,
    InterfaceStatsProbe, MemoryProbe, OsProbe, ProbeError, ProbeOutcome, TemperatureProbe,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{
    ComponentExt, CpuExt, CpuRefreshKind, DiskExt, DiskKind, NetworkExt, NetworksExt, RefreshKind,
    System, SystemExt,
};
use tracing::debug;

const CPU_SAMPLE_GAP: Duration = Duration::from_millis(250);

struct SysState {
    system: System,
    /// Only `network_stats` refreshes this one; its byte counters are deltas
    /// since the previous stats call.
    counters: System,
    last_net_refresh: Option<Instant>,
}

/// Hardware probes backed by `sysinfo`, topped up with `/sys` reads on Linux
/// and CIM queries on Windows.
pub struct SysinfoProvider {
    state: Arc<Mutex<SysState>>,
    runner: Arc<dyn CommandRunner>,
    host: HostOs,
}

impl SysinfoProvider {
    pub fn new(runner: Arc<dyn CommandRunner>, host: HostOs) -> Self {
        Self {
            state: Arc::new(Mutex::new(SysState {
                system: System::new_with_specifics(
                    RefreshKind::new().with_cpu(CpuRefreshKind::new()),
                ),
                counters: System::new(),
                last_net_refresh: None,
            })),
            runner,
            host,
        }
    }

    async fn with_system<T, F>(&self, f: F) -> ProbeOutcome<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SysState) -> T + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || {
            let mut guard = state
                .lock()
                .map_err(|_| ProbeError::Source("sysinfo state poisoned".to_string()))?;
            Ok(f(&mut guard))
        })
        .await
        .map_err(|e| ProbeError::Source(format!("sysinfo task failed: {e}")))?
    }

    async fn powershell_rows(
        &self,
        script: &str,
        columns: usize,
    ) -> ProbeOutcome<Vec<Vec<Option<String>>>> {
        let text = run_powershell(self.runner.as_ref(), script).await?;
        Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| split_pipe_row(l, columns))
            .collect())
    }

    async fn sysinfo_interfaces(&self) -> ProbeOutcome<Vec<(String, String)>> {
        self.with_system(|s| {
            s.system.refresh_networks_list();
            s.system
                .networks()
                .iter()
                .map(|(name, data)| (name.to_string(), data.mac_address().to_string()))
                .collect()
        })
        .await
    }

    async fn linux_interfaces(&self) -> ProbeOutcome<Vec<InterfaceProbe>> {
        let names = self.sysinfo_interfaces().await?;
        let addresses = match self.runner.run("ip", &["-o", "addr", "show"]).await {
            Ok(text) => parse_ip_addr(&text),
            Err(err) => {
                debug!(error = %err, "ip addr unavailable, adapters will have no address");
                HashMap::new()
            }
        };

        let mut out = Vec::with_capacity(names.len());
        for (iface, mac) in names {
            let base = Path::new("/sys/class/net").join(&iface);
            let operstate = read_trimmed(&base.join("operstate")).await;
            let link_type = read_trimmed(&base.join("type")).await;
            let wireless = tokio::fs::metadata(base.join("wireless")).await.is_ok();
            let is_virtual = tokio::fs::metadata(Path::new("/sys/devices/virtual/net").join(&iface))
                .await
                .is_ok();
            let AddressSet { ip4, ip6 } = addresses.get(&iface).cloned().unwrap_or_default();

            out.push(InterfaceProbe {
                kind: Some(
                    classify_linux_link(&iface, link_type.as_deref(), wireless, is_virtual)
                        .to_string(),
                ),
                iface,
                iface_name: None,
                mac: Some(mac),
                ip4,
                ip6,
                operstate,
            });
        }
        Ok(out)
    }

    async fn windows_interfaces(&self) -> ProbeOutcome<Vec<InterfaceProbe>> {
        let adapters = self
            .powershell_rows(
                "Get-NetAdapter | ForEach-Object { \"$($_.Name)|$($_.InterfaceDescription)|$($_.MacAddress)|$($_.Status)|$($_.PhysicalMediaType)|$($_.Virtual)\" }",
                6,
            )
            .await?;
        let addresses = self
            .powershell_rows(
                "Get-NetIPAddress -ErrorAction SilentlyContinue | ForEach-Object { \"$($_.InterfaceAlias)|$($_.AddressFamily)|$($_.IPAddress)\" }",
                3,
            )
            .await
            .unwrap_or_default();

        let mut by_alias: HashMap<String, AddressSet> = HashMap::new();
        for row in addresses {
            let (Some(alias), Some(family), Some(ip)) = (&row[0], &row[1], &row[2]) else {
                continue;
            };
            let entry = by_alias.entry(alias.clone()).or_default();
            match family.as_str() {
                "IPv4" if entry.ip4.is_none() => entry.ip4 = Some(ip.clone()),
                "IPv6" if entry.ip6.is_none() => entry.ip6 = Some(ip.clone()),
                _ => {}
            }
        }

        Ok(adapters
            .into_iter()
            .filter_map(|row| windows_adapter(&row, &by_alias))
            .collect())
    }

    async fn linux_battery(&self) -> ProbeOutcome<Option<BatteryProbe>> {
        let mut entries = match tokio::fs::read_dir("/sys/class/power_supply").await {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if read_trimmed(&path.join("type")).await.as_deref() != Some("Battery") {
                continue;
            }
            let percent = read_trimmed(&path.join("capacity"))
                .await
                .and_then(|v| parse_f64_loose(&v));
            let status = read_trimmed(&path.join("status")).await;
            return Ok(Some(BatteryProbe {
                percent,
                charging: linux_charging(status.as_deref()),
            }));
        }
        Ok(None)
    }

    async fn linux_graphics(&self) -> ProbeOutcome<GraphicsProbe> {
        let controllers = parse_lspci_graphics(&self.runner.run("lspci", &[]).await?);
        let displays = match self.runner.run("xrandr", &["--query"]).await {
            Ok(text) => parse_xrandr(&text),
            Err(err) => {
                debug!(error = %err, "xrandr unavailable, no display details");
                Vec::new()
            }
        };
        Ok(GraphicsProbe {
            controllers,
            displays,
        })
    }

    async fn windows_graphics(&self) -> ProbeOutcome<GraphicsProbe> {
        let controllers = self
            .powershell_rows(
                "Get-CimInstance Win32_VideoController | ForEach-Object { \"$($_.AdapterCompatibility)|$($_.Name)|$($_.AdapterRAM)\" }",
                3,
            )
            .await?
            .into_iter()
            .map(|row| GraphicsControllerProbe {
                vendor: row[0].clone(),
                model: row[1].clone(),
                vram_bytes: row[2].as_deref().and_then(parse_f64_loose),
            })
            .collect();
        let displays = self
            .powershell_rows(
                "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.Screen]::AllScreens | ForEach-Object { \"$($_.DeviceName)|$($_.Primary)|$($_.Bounds.Width)|$($_.Bounds.Height)|$($_.BitsPerPixel)\" }",
                5,
            )
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|row| windows_display(&row))
            .collect();
        Ok(GraphicsProbe {
            controllers,
            displays,
        })
    }

    async fn fallback_temperature(&self) -> ProbeOutcome<Option<f64>> {
        match self.host {
            HostOs::Linux => Ok(linux_thermal_zone().await),
            HostOs::Windows => {
                let rows = self
                    .powershell_rows(
                        "Get-CimInstance -Namespace root/wmi -ClassName MSAcpi_ThermalZoneTemperature -ErrorAction SilentlyContinue | ForEach-Object { \"$($_.InstanceName)|$($_.CurrentTemperature)\" }",
                        2,
                    )
                    .await?;
                Ok(rows
                    .iter()
                    .filter_map(|r| r[1].as_deref().and_then(parse_f64_loose))
                    .filter_map(normalize_windows_thermal_zone_temp)
                    .max_by(|a, b| a.total_cmp(b)))
            }
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }
}

#[async_trait]
impl HardwareProvider for SysinfoProvider {
    async fn ensure_available(&self) -> Result<(), ProbeError> {
        if System::IS_SUPPORTED {
            Ok(())
        } else {
            Err(ProbeError::Unsupported)
        }
    }

    async fn os_info(&self) -> ProbeOutcome<OsProbe> {
        self.with_system(|s| OsProbe {
            distro: s.system.name(),
            release: s.system.os_version(),
            arch: Some(std::env::consts::ARCH.to_string()),
        })
        .await
    }

    async fn hostname(&self) -> ProbeOutcome<String> {
        self.with_system(|s| s.system.host_name())
            .await?
            .ok_or_else(|| ProbeError::Source("host name not reported".to_string()))
    }

    async fn cpu(&self) -> ProbeOutcome<CpuProbe> {
        self.with_system(|s| {
            // No refresh: `cpu_load` owns the sampling window.
            CpuProbe {
                brand: s.system.cpus().first().map(|c| c.brand().trim().to_string()),
                physical_cores: s.system.physical_core_count().map(|n| n as u32),
            }
        })
        .await
    }

    async fn cpu_load(&self) -> ProbeOutcome<f64> {
        self.with_system(|s| s.system.refresh_cpu()).await?;
        tokio::time::sleep(CPU_SAMPLE_GAP).await;
        self.with_system(|s| {
            s.system.refresh_cpu();
            s.system.global_cpu_info().cpu_usage() as f64
        })
        .await
    }

    async fn memory(&self) -> ProbeOutcome<MemoryProbe> {
        self.with_system(|s| {
            s.system.refresh_memory();
            MemoryProbe {
                total: Some(s.system.total_memory() as f64),
                used: Some(s.system.used_memory() as f64),
                free: Some(s.system.available_memory() as f64),
            }
        })
        .await
    }

    async fn file_systems(&self) -> ProbeOutcome<Vec<FsProbe>> {
        self.with_system(|s| {
            s.system.refresh_disks_list();
            s.system
                .disks()
                .iter()
                .map(|d| {
                    let total = d.total_space();
                    FsProbe {
                        mount: d.mount_point().to_string_lossy().to_string(),
                        fs_type: Some(String::from_utf8_lossy(d.file_system()).to_string()),
                        size: Some(total as f64),
                        used: Some(total.saturating_sub(d.available_space()) as f64),
                    }
                })
                .collect()
        })
        .await
    }

    async fn disk_layout(&self) -> ProbeOutcome<Vec<DiskLayoutProbe>> {
        self.with_system(|s| {
            s.system
                .disks()
                .iter()
                .map(|d| DiskLayoutProbe {
                    device: d.name().to_string_lossy().to_string(),
                    kind: match d.kind() {
                        DiskKind::HDD => Some("HDD".to_string()),
                        DiskKind::SSD => Some("SSD".to_string()),
                        DiskKind::Unknown(_) => None,
                    },
                })
                .collect()
        })
        .await
    }

    async fn network_interfaces(&self) -> ProbeOutcome<Vec<InterfaceProbe>> {
        match self.host {
            HostOs::Linux => self.linux_interfaces().await,
            HostOs::Windows => self.windows_interfaces().await,
            HostOs::Other => Ok(self
                .sysinfo_interfaces()
                .await?
                .into_iter()
                .map(|(iface, mac)| InterfaceProbe {
                    iface,
                    mac: Some(mac),
                    ..InterfaceProbe::default()
                })
                .collect()),
        }
    }

    async fn network_stats(&self) -> ProbeOutcome<Vec<InterfaceStatsProbe>> {
        self.with_system(|s| {
            let previous = s.last_net_refresh.replace(Instant::now());
            refresh_counters(&mut s.counters);
            let elapsed = previous.map(|p| p.elapsed().as_secs_f64());
            s.counters
                .networks()
                .iter()
                .map(|(name, data)| {
                    let rate = |bytes: u64| {
                        elapsed
                            .filter(|secs| *secs > 0.0)
                            .map(|secs| bytes as f64 / secs)
                    };
                    InterfaceStatsProbe {
                        iface: name.to_string(),
                        rx_sec: rate(data.received()),
                        tx_sec: rate(data.transmitted()),
                    }
                })
                .collect()
        })
        .await
    }

    async fn graphics(&self) -> ProbeOutcome<GraphicsProbe> {
        match self.host {
            HostOs::Linux => self.linux_graphics().await,
            HostOs::Windows => self.windows_graphics().await,
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }

    async fn battery(&self) -> ProbeOutcome<Option<BatteryProbe>> {
        match self.host {
            HostOs::Linux => self.linux_battery().await,
            HostOs::Windows => {
                let rows = self
                    .powershell_rows(
                        "Get-CimInstance Win32_Battery | ForEach-Object { \"$($_.EstimatedChargeRemaining)|$($_.BatteryStatus)\" }",
                        2,
                    )
                    .await?;
                Ok(rows.first().map(|row| windows_battery(row)))
            }
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }

    async fn uptime(&self) -> ProbeOutcome<u64> {
        self.with_system(|s| s.system.uptime()).await
    }

    async fn bios(&self) -> ProbeOutcome<BiosProbe> {
        match self.host {
            HostOs::Linux => {
                let base = Path::new("/sys/class/dmi/id");
                Ok(BiosProbe {
                    vendor: read_trimmed(&base.join("bios_vendor")).await,
                    version: read_trimmed(&base.join("bios_version")).await,
                    release_date: read_trimmed(&base.join("bios_date")).await,
                })
            }
            HostOs::Windows => {
                let rows = self
                    .powershell_rows(
                        "Get-CimInstance Win32_BIOS | ForEach-Object { \"$($_.Manufacturer)|$($_.SMBIOSBIOSVersion)|$(if ($_.ReleaseDate) { $_.ReleaseDate.ToString('yyyy-MM-dd') })\" }",
                        3,
                    )
                    .await?;
                let row = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| ProbeError::Parse("empty Win32_BIOS output".to_string()))?;
                Ok(BiosProbe {
                    vendor: row[0].clone(),
                    version: row[1].clone(),
                    release_date: row[2].clone(),
                })
            }
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }

    async fn temperature(&self) -> ProbeOutcome<TemperatureProbe> {
        let sensors = self
            .with_system(|s| {
                s.system.refresh_components_list();
                s.system
                    .components()
                    .iter()
                    .map(|c| (c.label().to_string(), c.temperature() as f64))
                    .collect::<Vec<_>>()
            })
            .await?;

        let mut probe = pick_cpu_temperatures(&sensors);
        if probe.main.is_none() && probe.cores.is_empty() {
            probe.main = match self.fallback_temperature().await {
                Ok(v) => v,
                Err(err) => {
                    debug!(error = %err, "no fallback temperature source");
                    None
                }
            };
        }
        debug!(
            sensors = sensors.len(),
            main = ?probe.main,
            cores = probe.cores.len(),
            "temperature sources read"
        );
        Ok(probe)
    }
}

fn refresh_counters(counters: &mut System) {
    if counters.networks().iter().next().is_none() {
        counters.refresh_networks_list();
    } else {
        counters.refresh_networks();
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Link class from `/sys/class/net/<iface>` facts.
fn classify_linux_link(
    iface: &str,
    link_type: Option<&str>,
    wireless: bool,
    is_virtual: bool,
) -> &'static str {
    let lower = iface.to_ascii_lowercase();
    if link_type == Some("772") || lower == "lo" {
        "loopback"
    } else if lower.starts_with("bnep") || lower.starts_with("bt") {
        "bluetooth"
    } else if wireless {
        "wireless"
    } else if is_virtual {
        "virtual"
    } else if link_type == Some("1") {
        "ethernet"
    } else {
        "unknown"
    }
}

fn windows_adapter(
    row: &[Option<String>],
    addresses: &HashMap<String, AddressSet>,
) -> Option<InterfaceProbe> {
    let name = row[0].clone()?;
    let description = row[1].clone();
    let media = row[4].as_deref().unwrap_or_default().to_ascii_lowercase();
    let desc_lower = description.as_deref().unwrap_or_default().to_ascii_lowercase();

    let kind = if row[5].as_deref() == Some("True") {
        "virtual"
    } else if media.contains("bluetooth") || desc_lower.contains("bluetooth") {
        "bluetooth"
    } else if media.contains("802.11") || media.contains("wireless") || desc_lower.contains("wi-fi") {
        "wireless"
    } else if media.contains("802.3") {
        "ethernet"
    } else {
        "unknown"
    };
    let operstate = row[3].as_deref().map(|s| match s {
        "Up" => "up".to_string(),
        "Disconnected" | "Down" => "down".to_string(),
        other => other.to_ascii_lowercase(),
    });
    let AddressSet { ip4, ip6 } = addresses.get(&name).cloned().unwrap_or_default();

    Some(InterfaceProbe {
        iface: name,
        iface_name: description,
        kind: Some(kind.to_string()),
        mac: row[2].clone(),
        ip4,
        ip6,
        operstate,
    })
}

fn windows_display(row: &[Option<String>]) -> DisplayProbe {
    let number = |i: usize| {
        row[i]
            .as_deref()
            .and_then(parse_f64_loose)
            .filter(|v| *v > 0.0)
            .map(|v| v as u32)
    };
    DisplayProbe {
        model: row[0]
            .as_deref()
            .map(|n| n.trim_start_matches(r"\\.\").to_string()),
        main: row[1].as_deref() == Some("True"),
        resolution_x: number(2),
        resolution_y: number(3),
        pixel_depth: number(4),
    }
}

/// `BatteryStatus` 2 and 6..=9 mean the machine is on AC and charging.
fn windows_battery(row: &[Option<String>]) -> BatteryProbe {
    let status = row[1].as_deref().and_then(|s| s.parse::<u32>().ok());
    BatteryProbe {
        percent: row[0].as_deref().and_then(parse_f64_loose),
        charging: status.map(|s| matches!(s, 2 | 6..=9)),
    }
}

fn linux_charging(status: Option<&str>) -> Option<bool> {
    match status? {
        "Charging" => Some(true),
        "Discharging" | "Not charging" | "Full" => Some(false),
        _ => None,
    }
}

fn is_cpu_temp_sensor(label: &str) -> bool {
    let label = label.to_lowercase();
    let has_gpu_marker = ["gpu", "nvidia", "amdgpu", "radeon", "nouveau"]
        .iter()
        .any(|m| label.contains(m));
    if has_gpu_marker {
        return false;
    }
    [
        "coretemp",
        "k10temp",
        "zenpower",
        "cpu",
        "package",
        "tctl",
        "tdie",
        "core",
        "ccd",
    ]
    .iter()
    .any(|m| label.contains(m))
}

/// Package-level reading as the main value, per-core readings in label order.
fn pick_cpu_temperatures(sensors: &[(String, f64)]) -> TemperatureProbe {
    let cpu: Vec<&(String, f64)> = sensors
        .iter()
        .filter(|(label, value)| is_cpu_temp_sensor(label) && value.is_finite() && *value > 0.0)
        .collect();

    let mut cores: Vec<&(String, f64)> = cpu
        .iter()
        .copied()
        .filter(|(label, _)| label.to_lowercase().contains("core "))
        .collect();
    cores.sort_by(|a, b| a.0.cmp(&b.0));

    let main = cpu
        .iter()
        .find(|(label, _)| {
            let l = label.to_lowercase();
            ["package", "tctl", "tdie"].iter().any(|m| l.contains(m))
        })
        .map(|(_, v)| *v)
        .or_else(|| {
            cpu.iter()
                .map(|(_, v)| *v)
                .max_by(|a, b| a.total_cmp(b))
        });

    TemperatureProbe {
        main,
        cores: cores.into_iter().map(|(_, v)| *v).collect(),
    }
}

async fn linux_thermal_zone() -> Option<f64> {
    let mut entries = tokio::fs::read_dir("/sys/class/thermal").await.ok()?;
    let mut best: Option<f64> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_zone = path
            .file_name()
            .and_then(|v| v.to_str())
            .is_some_and(|n| n.starts_with("thermal_zone"));
        if !is_zone {
            continue;
        }
        let kind = read_trimmed(&path.join("type")).await.unwrap_or_default();
        if !["x86_pkg_temp", "cpu", "acpitz", "soc"]
            .iter()
            .any(|m| kind.to_lowercase().contains(m))
        {
            continue;
        }
        let Some(v) = read_trimmed(&path.join("temp"))
            .await
            .and_then(|raw| raw.parse::<f64>().ok())
        else {
            continue;
        };
        let celsius = if v > 1000.0 { v / 1000.0 } else { v };
        if celsius > 0.0 && best.map_or(true, |b| celsius > b) {
            best = Some(celsius);
        }
    }
    best
}

fn normalize_windows_thermal_zone_temp(raw: f64) -> Option<f64> {
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }

    // Tenths of Kelvin on most firmware, plain Kelvin on some.
    let mut v = raw;
    if v > 1000.0 {
        v /= 10.0;
    }
    if v > 200.0 {
        v -= 273.15;
    }

    if !(0.0..=130.0).contains(&v) {
        return None;
    }
    Some(v)
}
