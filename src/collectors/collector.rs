use crate::collectors::{
    now_unix, CollectionError, HardwareProvider, PlatformQuery, ProbeError, ProbeOutcome,
    RawProbes, ThroughputProbe,
};
use crate::metrics::Metrics;
use crate::normalize::{is_meaningful_interface, normalize};
use crate::snapshot::SystemSnapshot;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs every probe concurrently and folds the results into one snapshot.
pub struct Collector {
    provider: Arc<dyn HardwareProvider>,
    platform: Arc<dyn PlatformQuery>,
    probe_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl Collector {
    pub fn new(
        provider: Arc<dyn HardwareProvider>,
        platform: Arc<dyn PlatformQuery>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            platform,
            probe_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn collect(&self) -> Result<SystemSnapshot, CollectionError> {
        let raw = self.collect_raw().await?;
        let snapshot = normalize(&raw);
        if let Some(metrics) = &self.metrics {
            metrics.observe_snapshot(&snapshot);
        }
        Ok(snapshot)
    }

    pub async fn collect_raw(&self) -> Result<RawProbes, CollectionError> {
        let availability = match tokio::time::timeout(
            self.probe_timeout,
            self.provider.ensure_available(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.probe_timeout)),
        };
        if let Err(err) = availability {
            if let Some(metrics) = &self.metrics {
                metrics.inc_collection_error();
            }
            return Err(CollectionError::Unavailable(err));
        }

        let provider = &*self.provider;
        let platform = &*self.platform;
        let (
            os,
            hostname,
            cpu,
            cpu_load,
            memory,
            file_systems,
            disk_layout,
            interfaces,
            interface_stats,
            graphics,
            battery,
            uptime,
            bios,
            temperature,
            wifi_ssid,
            power_plan,
            security,
        ) = tokio::join!(
            self.probe("os", provider.os_info()),
            self.probe("hostname", provider.hostname()),
            self.probe("cpu", provider.cpu()),
            self.probe("cpu_load", provider.cpu_load()),
            self.probe("memory", provider.memory()),
            self.probe("file_systems", provider.file_systems()),
            self.probe("disk_layout", provider.disk_layout()),
            self.probe("network_interfaces", provider.network_interfaces()),
            self.probe("network_stats", provider.network_stats()),
            self.probe("graphics", provider.graphics()),
            self.probe("battery", provider.battery()),
            self.probe("uptime", provider.uptime()),
            self.probe("bios", provider.bios()),
            self.probe("temperature", provider.temperature()),
            self.probe("wifi_ssid", platform.wifi_ssid()),
            self.probe("power_plan", platform.power_plan()),
            self.probe("security", platform.security()),
        );

        let fallback_throughput = self
            .fallback_throughput(&interfaces, &interface_stats)
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.inc_collection();
        }

        Ok(RawProbes {
            collected_at_unix: now_unix(),
            os,
            hostname,
            cpu,
            cpu_load,
            memory,
            file_systems,
            disk_layout,
            interfaces,
            interface_stats,
            fallback_throughput,
            wifi_ssid: wifi_ssid.ok().flatten(),
            graphics,
            battery,
            power_plan: power_plan.ok().flatten(),
            uptime,
            bios,
            temperature,
            security,
        })
    }

    /// Platform counters for adapters the cross-platform stats did not cover.
    async fn fallback_throughput(
        &self,
        interfaces: &ProbeOutcome<Vec<crate::collectors::InterfaceProbe>>,
        stats: &ProbeOutcome<Vec<crate::collectors::InterfaceStatsProbe>>,
    ) -> HashMap<String, ThroughputProbe> {
        let Ok(interfaces) = interfaces else {
            return HashMap::new();
        };

        let measured = |iface: &str| -> bool {
            let Ok(stats) = stats else {
                return false;
            };
            stats.iter().any(|s| {
                s.iface == iface
                    && s.rx_sec.is_some_and(f64::is_finite)
                    && s.tx_sec.is_some_and(f64::is_finite)
            })
        };

        let pending: Vec<&str> = interfaces
            .iter()
            .filter(|i| is_meaningful_interface(i))
            .map(|i| i.iface.as_str())
            .filter(|iface| !measured(iface))
            .collect();
        if pending.is_empty() {
            return HashMap::new();
        }
        debug!(count = pending.len(), "falling back to platform adapter counters");

        let results = join_all(pending.iter().map(|iface| {
            self.probe("adapter_throughput", self.platform.adapter_throughput(iface))
        }))
        .await;

        pending
            .into_iter()
            .zip(results)
            .filter_map(|(iface, result)| result.ok().map(|t| (iface.to_string(), t)))
            .collect()
    }

    async fn probe<T, F>(&self, name: &'static str, fut: F) -> ProbeOutcome<T>
    where
        F: Future<Output = ProbeOutcome<T>>,
    {
        let outcome = match tokio::time::timeout(self.probe_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.probe_timeout)),
        };

        match &outcome {
            Err(ProbeError::Unsupported) => {
                debug!(probe = name, "probe not supported here, using fallback");
            }
            Err(err) => {
                warn!(probe = name, error = %err, "probe failed, using fallback");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_probe_failure(name);
                }
            }
            Ok(_) => {}
        }
        outcome
    }
}
