use crate::snapshot::{Carrier, SystemSnapshot};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub desk_cpu_load_percent: Gauge,
    pub desk_memory_used_bytes: Gauge,
    pub desk_memory_total_bytes: Gauge,
    pub desk_memory_usage_percent: Gauge,
    pub desk_disk_used_bytes: GaugeVec,
    pub desk_disk_total_bytes: GaugeVec,
    pub desk_disk_usage_percent: GaugeVec,
    pub desk_disk_count: Gauge,
    pub desk_net_adapter_count: Gauge,
    pub desk_net_adapter_connected: GaugeVec,
    pub desk_host_uptime_seconds: Gauge,
    pub desk_last_collect_timestamp_seconds: Gauge,
    pub desk_collections_total: Counter,
    pub desk_collection_errors_total: Counter,
    pub desk_probe_failures_total: CounterVec,
    pub desk_tickets_total: CounterVec,
    pub desk_update_events_total: CounterVec,
    pub desk_remote_support_launches_total: CounterVec,
    pub desk_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let desk_cpu_load_percent = Gauge::with_opts(opts!(
            "desk_cpu_load_percent",
            "Current CPU load in percent (0..100)"
        ))?;
        let desk_memory_used_bytes =
            Gauge::with_opts(opts!("desk_memory_used_bytes", "Used memory in bytes"))?;
        let desk_memory_total_bytes =
            Gauge::with_opts(opts!("desk_memory_total_bytes", "Total memory in bytes"))?;
        let desk_memory_usage_percent =
            Gauge::with_opts(opts!("desk_memory_usage_percent", "Memory usage in percent"))?;
        let desk_disk_used_bytes = GaugeVec::new(
            opts!("desk_disk_used_bytes", "Disk used bytes by mount"),
            &["mount"],
        )?;
        let desk_disk_total_bytes = GaugeVec::new(
            opts!("desk_disk_total_bytes", "Disk total bytes by mount"),
            &["mount"],
        )?;
        let desk_disk_usage_percent = GaugeVec::new(
            opts!("desk_disk_usage_percent", "Disk usage in percent by mount"),
            &["mount"],
        )?;
        let desk_disk_count =
            Gauge::with_opts(opts!("desk_disk_count", "Number of reported file systems"))?;
        let desk_net_adapter_count = Gauge::with_opts(opts!(
            "desk_net_adapter_count",
            "Number of adapters in the last snapshot, sentinel rows included"
        ))?;
        let desk_net_adapter_connected = GaugeVec::new(
            opts!(
                "desk_net_adapter_connected",
                "1 when the adapter carrier is connected"
            ),
            &["adapter"],
        )?;
        let desk_host_uptime_seconds =
            Gauge::with_opts(opts!("desk_host_uptime_seconds", "Host uptime in seconds"))?;
        let desk_last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "desk_last_collect_timestamp_seconds",
            "Unix timestamp of the last snapshot"
        ))?;
        let desk_collections_total = Counter::with_opts(opts!(
            "desk_collections_total",
            "Completed collection cycles"
        ))?;
        let desk_collection_errors_total = Counter::with_opts(opts!(
            "desk_collection_errors_total",
            "Collection cycles aborted because hardware information was unavailable"
        ))?;
        let desk_probe_failures_total = CounterVec::new(
            opts!(
                "desk_probe_failures_total",
                "Individual probe failures by probe"
            ),
            &["probe"],
        )?;
        let desk_tickets_total = CounterVec::new(
            opts!("desk_tickets_total", "Ticket submissions by result"),
            &["result"],
        )?;
        let desk_update_events_total = CounterVec::new(
            opts!("desk_update_events_total", "Self-update lifecycle events"),
            &["event"],
        )?;
        let desk_remote_support_launches_total = CounterVec::new(
            opts!(
                "desk_remote_support_launches_total",
                "Remote support launches by method"
            ),
            &["method"],
        )?;
        let desk_scrape_count_total =
            Counter::with_opts(opts!("desk_scrape_count_total", "Total /metrics scrapes"))?;

        register(&registry, &desk_cpu_load_percent)?;
        register(&registry, &desk_memory_used_bytes)?;
        register(&registry, &desk_memory_total_bytes)?;
        register(&registry, &desk_memory_usage_percent)?;
        register(&registry, &desk_disk_used_bytes)?;
        register(&registry, &desk_disk_total_bytes)?;
        register(&registry, &desk_disk_usage_percent)?;
        register(&registry, &desk_disk_count)?;
        register(&registry, &desk_net_adapter_count)?;
        register(&registry, &desk_net_adapter_connected)?;
        register(&registry, &desk_host_uptime_seconds)?;
        register(&registry, &desk_last_collect_timestamp_seconds)?;
        register(&registry, &desk_collections_total)?;
        register(&registry, &desk_collection_errors_total)?;
        register(&registry, &desk_probe_failures_total)?;
        register(&registry, &desk_tickets_total)?;
        register(&registry, &desk_update_events_total)?;
        register(&registry, &desk_remote_support_launches_total)?;
        register(&registry, &desk_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            desk_cpu_load_percent,
            desk_memory_used_bytes,
            desk_memory_total_bytes,
            desk_memory_usage_percent,
            desk_disk_used_bytes,
            desk_disk_total_bytes,
            desk_disk_usage_percent,
            desk_disk_count,
            desk_net_adapter_count,
            desk_net_adapter_connected,
            desk_host_uptime_seconds,
            desk_last_collect_timestamp_seconds,
            desk_collections_total,
            desk_collection_errors_total,
            desk_probe_failures_total,
            desk_tickets_total,
            desk_update_events_total,
            desk_remote_support_launches_total,
            desk_scrape_count_total,
        }))
    }

    pub fn observe_snapshot(&self, snapshot: &SystemSnapshot) {
        self.desk_cpu_load_percent
            .set(snapshot.cpu.current_load_percent);
        self.desk_memory_used_bytes
            .set(snapshot.memory.used_bytes as f64);
        self.desk_memory_total_bytes
            .set(snapshot.memory.total_bytes as f64);
        self.desk_memory_usage_percent
            .set(snapshot.memory.usage_percent);

        // Mounts and adapters come and go between cycles.
        self.desk_disk_used_bytes.reset();
        self.desk_disk_total_bytes.reset();
        self.desk_disk_usage_percent.reset();
        for d in &snapshot.disks {
            self.desk_disk_used_bytes
                .with_label_values(&[&d.mount])
                .set(d.used_bytes as f64);
            self.desk_disk_total_bytes
                .with_label_values(&[&d.mount])
                .set(d.total_bytes as f64);
            self.desk_disk_usage_percent
                .with_label_values(&[&d.mount])
                .set(d.usage_percent);
        }
        self.desk_disk_count.set(snapshot.disks.len() as f64);

        self.desk_net_adapter_connected.reset();
        for a in &snapshot.network.adapters {
            self.desk_net_adapter_connected
                .with_label_values(&[&a.name])
                .set(if a.status.carrier == Carrier::Connected {
                    1.0
                } else {
                    0.0
                });
        }
        self.desk_net_adapter_count
            .set(snapshot.network.adapters.len() as f64);

        self.desk_host_uptime_seconds
            .set(snapshot.uptime_seconds as f64);
        self.desk_last_collect_timestamp_seconds
            .set(snapshot.collected_at_unix as f64);
    }

    pub fn inc_collection(&self) {
        self.desk_collections_total.inc();
    }

    pub fn inc_collection_error(&self) {
        self.desk_collection_errors_total.inc();
    }

    pub fn inc_probe_failure(&self, probe: &str) {
        self.desk_probe_failures_total
            .with_label_values(&[probe])
            .inc();
    }

    pub fn inc_ticket(&self, result: &str) {
        self.desk_tickets_total.with_label_values(&[result]).inc();
    }

    pub fn inc_update_event(&self, event: &str) {
        self.desk_update_events_total
            .with_label_values(&[event])
            .inc();
    }

    pub fn inc_remote_support(&self, method: &str) {
        self.desk_remote_support_launches_total
            .with_label_values(&[method])
            .inc();
    }

    pub fn inc_scrape_count(&self) {
        self.desk_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, tests::blank_probes};

    #[test]
    fn snapshot_gauges_are_exported() {
        let metrics = Metrics::new().unwrap();
        let snapshot = normalize(&blank_probes());
        metrics.observe_snapshot(&snapshot);
        metrics.inc_probe_failure("bios");
        metrics.inc_ticket("sent");

        let text = String::from_utf8(metrics.encode_metrics().unwrap()).unwrap();
        assert!(text.contains("desk_memory_usage_percent 0"));
        assert!(text.contains(
            "desk_net_adapter_connected{adapter=\"Network Detection Failed\"} 0"
        ));
        assert!(text.contains("desk_probe_failures_total{probe=\"bios\"} 1"));
        assert!(text.contains("desk_tickets_total{result=\"sent\"} 1"));
        assert!(text.contains("desk_last_collect_timestamp_seconds 1700000000"));
    }
}
