use crate::collectors::{
    DisplayProbe, GraphicsControllerProbe, PlatformQuery, ProbeError, ProbeOutcome, SecurityProbe,
    ThroughputProbe,
};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    Linux,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }
}

/// Runs an external program and returns its decoded stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> ProbeOutcome<String>;
}

pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> ProbeOutcome<String> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| match source.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    ProbeError::CommandUnavailable {
                        program: program.to_string(),
                        source,
                    }
                }
                _ => ProbeError::Source(format!("{program}: {source}")),
            })?;

        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                program: program.to_string(),
                status: output.status.to_string(),
            });
        }
        Ok(decode_cmd_stdout(&output.stdout))
    }
}

pub async fn run_powershell(runner: &dyn CommandRunner, script: &str) -> ProbeOutcome<String> {
    let wrapped_script = format!(
        "[Console]::OutputEncoding=[System.Text.UTF8Encoding]::new($false); $OutputEncoding=[System.Text.UTF8Encoding]::new($false); chcp 65001 > $null; {script}"
    );
    match runner
        .run("powershell", &["-NoProfile", "-Command", &wrapped_script])
        .await
    {
        Err(ProbeError::CommandUnavailable { .. }) => {
            runner
                .run(
                    r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe",
                    &["-NoProfile", "-Command", &wrapped_script],
                )
                .await
        }
        other => other,
    }
}

/// Single-quoted PowerShell literal.
pub fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Queries that need OS-native tools rather than the hardware library.
pub struct SystemPlatform {
    runner: Arc<dyn CommandRunner>,
    host: HostOs,
    sample_interval: Duration,
}

impl SystemPlatform {
    pub fn new(runner: Arc<dyn CommandRunner>, host: HostOs) -> Self {
        Self {
            runner,
            host,
            sample_interval: Duration::from_secs(1),
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    async fn adapter_counters(&self, iface: &str) -> ProbeOutcome<(f64, f64)> {
        match self.host {
            HostOs::Windows => {
                let script = format!(
                    "Get-NetAdapterStatistics -Name {} | ForEach-Object {{ \"$($_.ReceivedBytes)|$($_.SentBytes)\" }}",
                    ps_quote(iface)
                );
                let text = run_powershell(self.runner.as_ref(), &script).await?;
                parse_adapter_counters(&text)
                    .ok_or_else(|| ProbeError::Parse(format!("adapter statistics for {iface}")))
            }
            HostOs::Linux => {
                let base = Path::new("/sys/class/net").join(iface).join("statistics");
                let rx = read_counter(&base.join("rx_bytes")).await?;
                let tx = read_counter(&base.join("tx_bytes")).await?;
                Ok((rx, tx))
            }
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }

    async fn firewall(&self) -> ProbeOutcome<(Option<bool>, Option<String>)> {
        match self.host {
            HostOs::Windows => {
                let text = self
                    .runner
                    .run("netsh", &["advfirewall", "show", "currentprofile"])
                    .await?;
                Ok(parse_netsh_firewall(&text))
            }
            HostOs::Linux => {
                let text = self.runner.run("ufw", &["status"]).await?;
                Ok((parse_ufw_status(&text), None))
            }
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }

    async fn antivirus(&self) -> ProbeOutcome<Vec<String>> {
        match self.host {
            HostOs::Windows => {
                let text = run_powershell(
                    self.runner.as_ref(),
                    "Get-CimInstance -Namespace root/SecurityCenter2 -ClassName AntivirusProduct -ErrorAction SilentlyContinue | ForEach-Object { $_.displayName }",
                )
                .await?;
                Ok(parse_lines(&text))
            }
            HostOs::Linux => Ok(Vec::new()),
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }
}

#[async_trait]
impl PlatformQuery for SystemPlatform {
    async fn wifi_ssid(&self) -> ProbeOutcome<Option<String>> {
        match self.host {
            HostOs::Windows => {
                let text = self
                    .runner
                    .run("netsh", &["wlan", "show", "interfaces"])
                    .await?;
                Ok(parse_netsh_ssid(&text))
            }
            HostOs::Linux => {
                match self
                    .runner
                    .run("nmcli", &["-t", "-f", "active,ssid", "dev", "wifi"])
                    .await
                {
                    Ok(text) => Ok(parse_nmcli_active_ssid(&text)),
                    Err(err) => {
                        debug!(error = %err, "nmcli unavailable, trying iwgetid");
                        let text = self.runner.run("iwgetid", &["-r"]).await?;
                        Ok(Some(text.trim().to_string()).filter(|s| !s.is_empty()))
                    }
                }
            }
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }

    async fn adapter_throughput(&self, iface: &str) -> ProbeOutcome<ThroughputProbe> {
        let started = Instant::now();
        let (rx0, tx0) = self.adapter_counters(iface).await?;
        tokio::time::sleep(self.sample_interval).await;
        let (rx1, tx1) = self.adapter_counters(iface).await?;
        let secs = started.elapsed().as_secs_f64().max(0.001);

        Ok(ThroughputProbe {
            rx_bytes_per_sec: ((rx1 - rx0).max(0.0)) / secs,
            tx_bytes_per_sec: ((tx1 - tx0).max(0.0)) / secs,
        })
    }

    async fn power_plan(&self) -> ProbeOutcome<Option<String>> {
        match self.host {
            HostOs::Windows => {
                let text = self.runner.run("powercfg", &["/getactivescheme"]).await?;
                Ok(parse_power_scheme(&text))
            }
            HostOs::Linux => {
                let text = self.runner.run("powerprofilesctl", &["get"]).await?;
                Ok(Some(text.trim().to_string()).filter(|s| !s.is_empty()))
            }
            HostOs::Other => Err(ProbeError::Unsupported),
        }
    }

    async fn security(&self) -> ProbeOutcome<SecurityProbe> {
        let (firewall, antivirus) = tokio::join!(self.firewall(), self.antivirus());
        match (firewall, antivirus) {
            (Err(err), Err(_)) => Err(err),
            (firewall, antivirus) => {
                let (firewall_enabled, firewall_profile) = firewall.unwrap_or((None, None));
                Ok(SecurityProbe {
                    firewall_enabled,
                    firewall_profile,
                    antivirus: antivirus.unwrap_or_default(),
                })
            }
        }
    }
}

async fn read_counter(path: &Path) -> ProbeOutcome<f64> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProbeError::Source(format!("{}: {e}", path.display())))?;
    parse_f64_loose(&raw).ok_or_else(|| ProbeError::Parse(path.display().to_string()))
}

/// Compiled once per pattern; `None` only if the literal pattern is invalid.
fn cached_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn ssid_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"(?m)^\s*SSID\s*:\s*(.+)$")
}

fn power_scheme_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"Power Scheme GUID: .*\((.*)\)")
}

pub fn parse_netsh_ssid(text: &str) -> Option<String> {
    ssid_regex()?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn parse_nmcli_active_ssid(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("yes:"))
        .map(|ssid| ssid.replace("\\:", ":"))
        .find(|ssid| !ssid.is_empty())
}

pub fn parse_adapter_counters(text: &str) -> Option<(f64, f64)> {
    text.lines().find_map(|line| {
        let (rx, tx) = line.trim().split_once('|')?;
        Some((parse_f64_loose(rx)?, parse_f64_loose(tx)?))
    })
}

pub fn parse_power_scheme(text: &str) -> Option<String> {
    power_scheme_regex()?
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `(enabled, profile)` from `netsh advfirewall show currentprofile`.
pub fn parse_netsh_firewall(text: &str) -> (Option<bool>, Option<String>) {
    let mut profile = None;
    let mut state = None;
    for line in text.lines().map(str::trim) {
        if let Some(name) = line.strip_suffix("Profile Settings:") {
            profile = Some(name.trim().to_string()).filter(|s| !s.is_empty());
            continue;
        }
        let mut parts = line.split_whitespace();
        if parts.next() == Some("State") {
            state = match parts.next().map(str::to_ascii_uppercase).as_deref() {
                Some("ON") => Some(true),
                Some("OFF") => Some(false),
                _ => state,
            };
        }
    }
    (state, profile)
}

pub fn parse_ufw_status(text: &str) -> Option<bool> {
    text.lines().find_map(|line| {
        let status = line.trim().strip_prefix("Status:")?.trim();
        match status {
            "active" => Some(true),
            "inactive" => Some(false),
            _ => None,
        }
    })
}

pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits `a|b|c` rows emitted by the PowerShell probes; blank cells become `None`.
pub fn split_pipe_row(line: &str, columns: usize) -> Option<Vec<Option<String>>> {
    let cells: Vec<Option<String>> = line
        .trim_end_matches(['\r', '\n'])
        .split('|')
        .map(|c| Some(c.trim().to_string()).filter(|c| !c.is_empty()))
        .collect();
    (cells.len() == columns).then_some(cells)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddressSet {
    pub ip4: Option<String>,
    pub ip6: Option<String>,
}

/// First IPv4/IPv6 address per interface from `ip -o addr show`.
pub fn parse_ip_addr(text: &str) -> HashMap<String, AddressSet> {
    let mut out: HashMap<String, AddressSet> = HashMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let (Some(_), Some(iface), Some(family), Some(addr)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let iface = iface.trim_end_matches(':').to_string();
        let addr = addr.split('/').next().unwrap_or(addr).to_string();
        let entry = out.entry(iface).or_default();
        match family {
            "inet" if entry.ip4.is_none() => entry.ip4 = Some(addr),
            "inet6" if entry.ip6.is_none() => entry.ip6 = Some(addr),
            _ => {}
        }
    }
    out
}

pub fn parse_lspci_graphics(text: &str) -> Vec<GraphicsControllerProbe> {
    text.lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once(' ')?;
            let (class, desc) = rest.split_once(": ")?;
            let class = class.to_ascii_lowercase();
            if !(class.contains("vga") || class.contains("3d controller") || class.contains("display controller")) {
                return None;
            }
            let desc = match desc.rfind(" (rev ") {
                Some(idx) => &desc[..idx],
                None => desc,
            };
            let model = match (desc.find('['), desc.rfind(']')) {
                (Some(start), Some(end)) if end > start => desc[start + 1..end].to_string(),
                _ => desc.to_string(),
            };
            Some(GraphicsControllerProbe {
                vendor: Some(gpu_vendor(desc)),
                model: Some(model),
                vram_bytes: None,
            })
        })
        .collect()
}

fn gpu_vendor(desc: &str) -> String {
    let lower = desc.to_lowercase();
    if lower.contains("nvidia") {
        "NVIDIA".to_string()
    } else if lower.contains("advanced micro devices") || lower.contains("amd") || lower.contains("ati ") {
        "AMD".to_string()
    } else if lower.contains("intel") {
        "Intel".to_string()
    } else {
        desc.split_whitespace().next().unwrap_or_default().to_string()
    }
}

pub fn parse_xrandr(text: &str) -> Vec<DisplayProbe> {
    text.lines()
        .filter(|line| !line.starts_with(' ') && line.contains(" connected"))
        .map(|line| {
            let mut tokens = line.split_whitespace();
            let name = tokens.next().map(str::to_string);
            let rest: Vec<&str> = tokens.collect();
            let main = rest.contains(&"primary");
            let (resolution_x, resolution_y) = rest
                .iter()
                .find_map(|t| {
                    let geometry = t.split('+').next()?;
                    let (w, h) = geometry.split_once('x')?;
                    Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?))
                })
                .map(|(w, h)| (Some(w), Some(h)))
                .unwrap_or((None, None));
            DisplayProbe {
                model: name,
                main,
                resolution_x,
                resolution_y,
                pixel_depth: None,
            }
        })
        .collect()
}

pub fn parse_f64_loose(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        return Some(v);
    }

    if let Ok(v) = trimmed.replace(',', ".").parse::<f64>() {
        return Some(v);
    }

    let filtered: String = trimmed
        .chars()
        .filter(|c| {
            c.is_ascii_digit()
                || *c == '.'
                || *c == ','
                || *c == 'e'
                || *c == 'E'
                || *c == '-'
                || *c == '+'
        })
        .collect();
    if filtered.is_empty() {
        return None;
    }

    filtered.replace(',', ".").parse::<f64>().ok()
}

/// Console tools on Windows sometimes answer in UTF-16LE.
pub fn decode_cmd_stdout(bytes: &[u8]) -> String {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }

    if bytes.len() >= 2 && bytes.len() % 2 == 0 {
        let u16buf: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&u16buf) {
            return s;
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers commands from a table keyed by program name.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        pub(crate) replies: HashMap<&'static str, Vec<String>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub(crate) fn reply(mut self, program: &'static str, text: &str) -> Self {
            self.replies
                .entry(program)
                .or_default()
                .push(text.to_string());
            self
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[&str]) -> ProbeOutcome<String> {
            let mut calls = self.calls.lock().unwrap();
            let nth = calls.iter().filter(|c| c.starts_with(program)).count();
            calls.push(format!("{program} {}", args.join(" ")));
            match self.replies.get(program) {
                Some(replies) if !replies.is_empty() => {
                    Ok(replies[nth.min(replies.len() - 1)].clone())
                }
                _ => Err(ProbeError::CommandUnavailable {
                    program: program.to_string(),
                    source: std::io::Error::from(ErrorKind::NotFound),
                }),
            }
        }
    }

    const NETSH_WLAN: &str = "
There is 1 interface on the system:

    Name                   : Wi-Fi
    Description            : Intel(R) Wi-Fi 6 AX201 160MHz
    State                  : connected
    SSID                   : Office Guest
    BSSID                  : 3c:37:86:aa:bb:cc
    Network type           : Infrastructure
";

    #[test]
    fn netsh_ssid_skips_bssid() {
        assert_eq!(parse_netsh_ssid(NETSH_WLAN).as_deref(), Some("Office Guest"));
        assert_eq!(parse_netsh_ssid("    BSSID : 3c:37:86:aa:bb:cc"), None);
        assert_eq!(parse_netsh_ssid("There is no wireless interface"), None);
    }

    #[test]
    fn nmcli_picks_active_network() {
        let text = "no:Neighbour\nyes:Home\\:5G\nno:\n";
        assert_eq!(parse_nmcli_active_ssid(text).as_deref(), Some("Home:5G"));
        assert_eq!(parse_nmcli_active_ssid("no:Neighbour\n"), None);
    }

    #[test]
    fn power_scheme_name_is_extracted() {
        let text = "Power Scheme GUID: 381b4222-f694-41f0-9685-ff5bb260df2e  (Balanced)";
        assert_eq!(parse_power_scheme(text).as_deref(), Some("Balanced"));
        assert_eq!(parse_power_scheme("nothing"), None);
    }

    #[test]
    fn parser_regexes_compile_once() {
        let ssid = ssid_regex().expect("ssid pattern compiles");
        assert!(std::ptr::eq(ssid, ssid_regex().unwrap()));
        let scheme = power_scheme_regex().expect("power scheme pattern compiles");
        assert!(std::ptr::eq(scheme, power_scheme_regex().unwrap()));
    }

    #[test]
    fn netsh_firewall_state_and_profile() {
        let text = "
Domain Profile Settings:
----------------------------------------------------------------------
State                                 ON
Firewall Policy                       BlockInbound,AllowOutbound
Ok.
";
        assert_eq!(
            parse_netsh_firewall(text),
            (Some(true), Some("Domain".to_string()))
        );
        assert_eq!(parse_netsh_firewall("State OFF"), (Some(false), None));
        assert_eq!(parse_ufw_status("Status: inactive\n"), Some(false));
    }

    #[test]
    fn ip_addr_keeps_first_address_per_family() {
        let text = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: wlp2s0    inet 192.168.1.23/24 brd 192.168.1.255 scope global dynamic wlp2s0\\       valid_lft 85000sec
2: wlp2s0    inet 10.8.0.2/24 scope global secondary wlp2s0
2: wlp2s0    inet6 fe80::1c2d:3e4f:5a6b:7c8d/64 scope link \\       valid_lft forever
";
        let map = parse_ip_addr(text);
        let wifi = &map["wlp2s0"];
        assert_eq!(wifi.ip4.as_deref(), Some("192.168.1.23"));
        assert_eq!(wifi.ip6.as_deref(), Some("fe80::1c2d:3e4f:5a6b:7c8d"));
        assert_eq!(map["lo"].ip6, None);
    }

    #[test]
    fn lspci_graphics_rows() {
        let text = "\
00:02.0 VGA compatible controller: Intel Corporation UHD Graphics 620 (rev 07)
00:1f.3 Audio device: Intel Corporation Sunrise Point-LP HD Audio (rev 21)
01:00.0 3D controller: NVIDIA Corporation GA107M [GeForce RTX 3050 Mobile] (rev a1)
";
        let gpus = parse_lspci_graphics(text);
        assert_eq!(gpus.len(), 2);
        assert_eq!(gpus[0].vendor.as_deref(), Some("Intel"));
        assert_eq!(gpus[0].model.as_deref(), Some("Intel Corporation UHD Graphics 620"));
        assert_eq!(gpus[1].vendor.as_deref(), Some("NVIDIA"));
        assert_eq!(gpus[1].model.as_deref(), Some("GeForce RTX 3050 Mobile"));
    }

    #[test]
    fn xrandr_connected_outputs() {
        let text = "\
Screen 0: minimum 320 x 200, current 3840 x 1080, maximum 16384 x 16384
eDP-1 connected primary 1920x1080+0+0 (normal left inverted right x axis y axis) 309mm x 174mm
   1920x1080     60.02*+
HDMI-1 connected 1920x1080+1920+0 (normal left inverted right x axis y axis) 527mm x 296mm
DP-1 disconnected (normal left inverted right x axis y axis)
DP-2 connected (normal left inverted right x axis y axis)
";
        let displays = parse_xrandr(text);
        assert_eq!(displays.len(), 3);
        assert!(displays[0].main);
        assert_eq!(displays[0].resolution_x, Some(1920));
        assert_eq!(displays[1].model.as_deref(), Some("HDMI-1"));
        assert!(!displays[1].main);
        assert_eq!(displays[2].resolution_x, None);
    }

    #[test]
    fn pipe_rows_and_loose_numbers() {
        let row = split_pipe_row("NVIDIA| GeForce GTX 1650 |4293918720\r", 3).unwrap();
        assert_eq!(row[1].as_deref(), Some("GeForce GTX 1650"));
        assert!(split_pipe_row("a|b", 3).is_none());
        assert_eq!(split_pipe_row("|x|", 3).unwrap()[0], None);

        assert_eq!(parse_f64_loose("12,5"), Some(12.5));
        assert_eq!(parse_f64_loose(" 42 %"), Some(42.0));
        assert_eq!(parse_f64_loose("n/a"), None);
        assert_eq!(ps_quote("Wi-Fi 'Home'"), "'Wi-Fi ''Home'''");
    }

    #[test]
    fn utf16_console_output_is_decoded() {
        let bytes: Vec<u8> = "SSID : Caf\u{e9}"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        assert_eq!(decode_cmd_stdout(&bytes), "SSID : Caf\u{e9}");
    }

    #[tokio::test]
    async fn windows_platform_queries() {
        let runner = ScriptedRunner::default()
            .reply("netsh", NETSH_WLAN)
            .reply("powercfg", "Power Scheme GUID: 8c5e7fda  (High performance)")
            .reply("powershell", "1000|500")
            .reply("powershell", "3000|1500");
        let runner = Arc::new(runner);
        let platform = SystemPlatform::new(runner.clone(), HostOs::Windows)
            .with_sample_interval(Duration::from_millis(10));

        let ssid = platform.wifi_ssid().await.unwrap();
        assert_eq!(ssid.as_deref(), Some("Office Guest"));
        let plan = platform.power_plan().await.unwrap();
        assert_eq!(plan.as_deref(), Some("High performance"));

        let t = platform.adapter_throughput("Wi-Fi").await.unwrap();
        assert!(t.rx_bytes_per_sec > 0.0);
        assert!(t.rx_bytes_per_sec > t.tx_bytes_per_sec);

        let calls = runner.calls.lock().unwrap();
        assert!(calls
            .iter()
            .any(|c| c.contains("Get-NetAdapterStatistics -Name 'Wi-Fi'")));
    }

    #[tokio::test]
    async fn missing_tools_surface_as_errors() {
        let platform = SystemPlatform::new(Arc::new(ScriptedRunner::default()), HostOs::Linux);
        assert!(matches!(
            platform.power_plan().await,
            Err(ProbeError::CommandUnavailable { .. })
        ));
        assert!(platform.wifi_ssid().await.is_err());

        let other = SystemPlatform::new(Arc::new(ScriptedRunner::default()), HostOs::Other);
        assert!(matches!(other.security().await, Err(ProbeError::Unsupported)));
    }
}
