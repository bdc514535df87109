//! Plain-text and HTML renderings of a snapshot for support tickets.
//!
//! Both renderers are total: every field has a textual fallback, and rows
//! always come out in the same order.

use crate::snapshot::{bytes_to_gb, SystemSnapshot, NOT_AVAILABLE};
use crate::ticket::TicketFields;
use std::fmt::Write;
use std::time::{Duration, UNIX_EPOCH};

const LABEL_STYLE: &str = "background:#f4f4f4;font-weight:bold;";
const LIST_STYLE: &str = "margin:0;padding-left:15px;";

pub fn format_uptime(seconds: u64) -> String {
    format!("{} hours, {} minutes", seconds / 3600, (seconds % 3600) / 60)
}

fn format_collected_at(unix: i64) -> String {
    let ts = UNIX_EPOCH + Duration::from_secs(unix.max(0) as u64);
    humantime::format_rfc3339_seconds(ts).to_string()
}

/// One labelled row; list rows carry their items instead of a value.
enum Row {
    Value(&'static str, String),
    List(&'static str, Vec<String>),
}

fn rows(snapshot: &SystemSnapshot) -> Vec<Row> {
    let mut out = vec![
        Row::Value("Platform", snapshot.platform.to_string()),
        Row::Value("Hostname", snapshot.hostname.clone()),
        Row::Value("Uptime", format_uptime(snapshot.uptime_seconds)),
        Row::Value(
            "CPU",
            format!("{} ({} cores)", snapshot.cpu.model, snapshot.cpu.core_count),
        ),
        Row::Value(
            "CPU Load",
            format!("{:.1}%", snapshot.cpu.current_load_percent),
        ),
        Row::Value(
            "Memory",
            format!(
                "{:.2} GB used / {:.2} GB total ({:.1}%)",
                bytes_to_gb(snapshot.memory.used_bytes),
                bytes_to_gb(snapshot.memory.total_bytes),
                snapshot.memory.usage_percent
            ),
        ),
        Row::List(
            "Disks",
            snapshot
                .disks
                .iter()
                .map(|d| {
                    format!(
                        "{} ({}): {:.2} GB used / {:.2} GB total ({:.1}%)",
                        d.mount,
                        d.fs_type,
                        bytes_to_gb(d.used_bytes),
                        bytes_to_gb(d.total_bytes),
                        d.usage_percent
                    )
                })
                .collect(),
        ),
        Row::List(
            "Network",
            snapshot
                .network
                .adapters
                .iter()
                .map(|a| {
                    format!(
                        "{} ({}) - IP: {}, MAC: {}, WiFi: {}, Status: {}, Up: {}, Down: {}",
                        a.name,
                        a.kind.as_str(),
                        a.ip,
                        a.mac,
                        a.wifi_network_name,
                        a.status.carrier.as_str(),
                        a.throughput.upload,
                        a.throughput.download
                    )
                })
                .collect(),
        ),
        Row::List(
            "Graphics",
            snapshot
                .graphics
                .iter()
                .map(|g| format!("{} {} ({} MB)", g.vendor, g.model, g.vram_mb))
                .collect(),
        ),
        Row::Value(
            "Battery",
            match &snapshot.battery {
                Some(b) => format!(
                    "Charge: {}, Charging: {}, Power Plan: {}",
                    b.percentage, b.charging, b.power_plan
                ),
                None => "No battery".to_string(),
            },
        ),
    ];

    let info = snapshot.additional_info.as_ref();
    out.push(Row::Value(
        "BIOS",
        info.and_then(|i| i.bios.as_ref())
            .map(|b| format!("{} v{} ({})", b.vendor, b.version, b.release_date))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    ));
    out.push(Row::List(
        "Displays",
        info.and_then(|i| i.display.as_ref())
            .map(|displays| {
                displays
                    .iter()
                    .map(|d| {
                        let depth = d
                            .pixel_depth
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
                        let main = if d.is_main { " (Main)" } else { "" };
                        format!("{}{} - {}, Depth: {}", d.model, main, d.resolution, depth)
                    })
                    .collect()
            })
            .unwrap_or_default(),
    ));
    if let Some(t) = info.and_then(|i| i.temperatures.as_ref()) {
        out.push(Row::Value(
            "Temperatures",
            format!("CPU: {}, Cores: {}", t.cpu_c, t.cores_c),
        ));
    }
    if let Some(s) = info.and_then(|i| i.security.as_ref()) {
        out.push(Row::Value(
            "Security",
            format!("Firewall: {}, Antivirus: {}", s.firewall, s.antivirus),
        ));
    }
    out.push(Row::Value(
        "Collected",
        format_collected_at(snapshot.collected_at_unix),
    ));
    out
}

pub fn render_plain_text(snapshot: &SystemSnapshot) -> String {
    let mut out = String::new();
    for row in rows(snapshot) {
        match row {
            Row::Value(label, value) => {
                let _ = writeln!(out, "{label}: {value}");
            }
            Row::List(label, items) if items.is_empty() => {
                let _ = writeln!(out, "{label}: {NOT_AVAILABLE}");
            }
            Row::List(label, items) => {
                let _ = writeln!(out, "{label}:");
                for item in items {
                    let _ = writeln!(out, "  - {item}");
                }
            }
        }
    }
    out
}

fn system_info_table(snapshot: &SystemSnapshot) -> String {
    let mut html = String::from(
        "<table border=\"1\" cellpadding=\"6\" cellspacing=\"0\" style=\"border-collapse:collapse;font-size:13px;margin-top:8px;\">",
    );
    for row in rows(snapshot) {
        let (label, cell) = match row {
            Row::Value(label, value) => (label, escape_html(&value)),
            Row::List(label, items) if items.is_empty() => (label, NOT_AVAILABLE.to_string()),
            Row::List(label, items) => {
                let lis: String = items
                    .iter()
                    .map(|i| format!("<li>{}</li>", escape_html(i)))
                    .collect();
                (label, format!("<ul style=\"{LIST_STYLE}\">{lis}</ul>"))
            }
        };
        let _ = write!(
            html,
            "<tr><td style=\"{LABEL_STYLE}\">{label}</td><td>{cell}</td></tr>"
        );
    }
    html.push_str("</table>");
    html
}

pub fn render_html(snapshot: &SystemSnapshot, ticket: &TicketFields) -> String {
    format!(
        concat!(
            "<div style=\"font-family:Segoe UI,Arial,sans-serif;font-size:15px;color:#222;max-width:700px;margin:auto;\">",
            "<h2 style=\"background:#2ecc71;color:#fff;padding:12px 18px;border-radius:6px 6px 0 0;margin:0 0 12px 0;\">Support Ticket Details</h2>",
            "<table cellpadding=\"6\" cellspacing=\"0\" style=\"border-collapse:collapse;font-size:15px;width:100%;margin-bottom:18px;\">",
            "<tr><td style=\"font-weight:bold;width:140px;\">Full Name:</td><td>{name}</td></tr>",
            "<tr><td style=\"font-weight:bold;\">Email:</td><td>{email}</td></tr>",
            "<tr><td style=\"font-weight:bold;\">Phone:</td><td>{phone}</td></tr>",
            "</table>",
            "<div style=\"margin-bottom:18px;padding:10px 14px;background:#f9f9f9;border-left:4px solid #2ecc71;border-radius:4px;\">",
            "<div style=\"font-weight:bold;margin-bottom:4px;\">Description:</div>",
            "<div style=\"white-space:pre-line;\">{description}</div>",
            "</div>",
            "<div style=\"margin-bottom:8px;font-weight:bold;\">System Information:</div>",
            "{table}",
            "</div>"
        ),
        name = escape_html(&ticket.full_name),
        email = escape_html(&ticket.email),
        phone = escape_html(&ticket.phone),
        description = escape_html(&ticket.description),
        table = system_info_table(snapshot),
    )
}

/// Plain-text mail body: ticket header followed by the system report.
pub fn render_ticket_text(snapshot: &SystemSnapshot, ticket: &TicketFields) -> String {
    format!(
        "Support Ticket Details:\n\nFull Name: {}\nEmail: {}\nPhone: {}\n\nDescription:\n{}\n\nSystem Information:\n{}",
        ticket.full_name,
        ticket.email,
        ticket.phone,
        ticket.description,
        render_plain_text(snapshot)
    )
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, tests::blank_probes};
    use crate::snapshot::DiskInfo;

    fn disk(mount: &str) -> DiskInfo {
        DiskInfo {
            mount: mount.to_string(),
            fs_type: "ext4".to_string(),
            total_bytes: 1 << 30,
            used_bytes: 1 << 29,
            free_bytes: 1 << 29,
            usage_percent: 50.0,
        }
    }

    fn ticket() -> TicketFields {
        TicketFields {
            full_name: "Ada <Admin>".to_string(),
            email: "ada@example.com".to_string(),
            phone: "(082) 555-1234".to_string(),
            description: "Printer & scanner offline".to_string(),
        }
    }

    fn assert_each_once_in_order(text: &str, mounts: &[&str]) {
        let mut last = 0;
        for m in mounts {
            assert_eq!(text.matches(m).count(), 1, "{m} in {text}");
            let pos = text.find(m).unwrap();
            assert!(pos >= last, "{m} out of order");
            last = pos;
        }
    }

    #[test]
    fn disks_render_once_and_in_order() {
        let mut snapshot = normalize(&blank_probes());
        let mounts = ["/srv/zeta", "/srv/alpha", "/srv/mid"];
        snapshot.disks = mounts.iter().map(|m| disk(m)).collect();

        assert_each_once_in_order(&render_plain_text(&snapshot), &mounts);
        assert_each_once_in_order(&render_html(&snapshot, &ticket()), &mounts);
    }

    #[test]
    fn degraded_snapshot_renders_fallbacks() {
        let snapshot = normalize(&blank_probes());
        let text = render_plain_text(&snapshot);
        assert!(text.contains("Hostname: Unknown"));
        assert!(text.contains("Disks: N/A"));
        assert!(text.contains("Network Detection Failed (UNKNOWN)"));
        assert!(text.contains("Battery: Charge: N/A, Charging: Unknown, Power Plan: Unknown"));
        assert!(text.contains("BIOS: N/A"));
        assert!(text.contains("Collected: 2023-11-14T22:13:20Z"));
    }

    #[test]
    fn row_order_is_fixed() {
        let text = render_plain_text(&normalize(&blank_probes()));
        let labels = [
            "Platform:", "Hostname:", "Uptime:", "CPU:", "CPU Load:", "Memory:", "Disks:",
            "Network:", "Graphics:", "Battery:", "BIOS:", "Displays:",
        ];
        let positions: Vec<usize> = labels.iter().map(|l| text.find(l).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
    }

    #[test]
    fn html_escapes_user_input() {
        let html = render_html(&normalize(&blank_probes()), &ticket());
        assert!(html.contains("Ada &lt;Admin&gt;"));
        assert!(html.contains("Printer &amp; scanner offline"));
        assert!(!html.contains("<Admin>"));
    }

    #[test]
    fn uptime_is_hours_and_minutes() {
        assert_eq!(format_uptime(3900), "1 hours, 5 minutes");
        assert_eq!(format_uptime(59), "0 hours, 0 minutes");
    }
}
