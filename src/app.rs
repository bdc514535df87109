//! Composition root shared by the HTTP surface and the background tasks.

use crate::collectors::collector::Collector;
use crate::collectors::platform::{CommandRunner, HostOs, SystemPlatform, TokioCommandRunner};
use crate::collectors::system::SysinfoProvider;
use crate::collectors::{now_unix, CollectionError};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::remote::{DetachedLauncher, ProcessLauncher, RemoteSupport, RemoteSupportError};
use crate::snapshot::SystemSnapshot;
use crate::ticket::{DeliveryError, MailTransport, SmtpMailer, TicketService};
use crate::update::{HttpUpdateFeed, Installer, ProcessInstaller, UpdateError, UpdateFeed, UpdateManager};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize metrics: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("failed to set up mail transport: {0}")]
    Mail(#[from] DeliveryError),
    #[error("failed to set up updates: {0}")]
    Update(#[from] UpdateError),
    #[error("failed to set up remote support: {0}")]
    Remote(#[from] RemoteSupportError),
}

/// Last poll result as seen by the widget.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestSnapshot {
    pub snapshot: Option<SystemSnapshot>,
    pub error: Option<String>,
    pub updated_at_unix: i64,
}

/// External collaborators, swapped for fakes in tests.
pub struct Services {
    pub collector: Arc<Collector>,
    pub mail: Option<Arc<dyn MailTransport>>,
    pub feed: Option<Arc<dyn UpdateFeed>>,
    pub installer: Arc<dyn Installer>,
    pub launcher: Arc<dyn ProcessLauncher>,
}

pub struct AppContext {
    pub config: Config,
    pub metrics: Arc<Metrics>,
    pub collector: Arc<Collector>,
    pub tickets: Arc<TicketService>,
    pub updates: Arc<UpdateManager>,
    pub remote: Arc<RemoteSupport>,
    latest: RwLock<LatestSnapshot>,
    refresh: Notify,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    /// Wires the real providers for the current host.
    pub fn init(config: Config) -> Result<Arc<Self>, AppError> {
        let metrics = Metrics::new()?;
        let host = HostOs::current();
        let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner);
        let collector = Collector::new(
            Arc::new(SysinfoProvider::new(runner.clone(), host)),
            Arc::new(SystemPlatform::new(runner, host)),
            config.probe_timeout(),
        )
        .with_metrics(metrics.clone());

        let mail: Option<Arc<dyn MailTransport>> = match &config.mail.smtp_host {
            Some(_) => Some(Arc::new(SmtpMailer::from_config(&config.mail)?)),
            None => {
                info!("SMTP server not configured, tickets are disabled");
                None
            }
        };
        let feed: Option<Arc<dyn UpdateFeed>> = match (&config.update.feed_url, config.update.enabled) {
            (Some(url), true) => Some(Arc::new(HttpUpdateFeed::new(url.clone())?)),
            _ => None,
        };

        Self::assemble(
            config,
            metrics,
            Services {
                collector: Arc::new(collector),
                mail,
                feed,
                installer: Arc::new(ProcessInstaller),
                launcher: Arc::new(DetachedLauncher),
            },
        )
    }

    pub fn assemble(
        config: Config,
        metrics: Arc<Metrics>,
        services: Services,
    ) -> Result<Arc<Self>, AppError> {
        let (shutdown_tx, _) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);

        let tickets = TicketService::new(
            services.collector.clone(),
            services.mail,
            config.mail.clone(),
        )
        .with_metrics(metrics.clone());
        let updates = UpdateManager::new(
            config.update.clone(),
            services.feed,
            services.installer,
            shutdown.clone(),
        )
        .with_metrics(metrics.clone());
        let remote = RemoteSupport::new(config.remote_support.clone(), services.launcher)?
            .with_metrics(metrics.clone());

        Ok(Arc::new(Self {
            config,
            metrics,
            collector: services.collector,
            tickets: Arc::new(tickets),
            updates: Arc::new(updates),
            remote: Arc::new(remote),
            latest: RwLock::new(LatestSnapshot::default()),
            refresh: Notify::new(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Spawns the poller and the update scheduler.
    pub async fn start(self: &Arc<Self>) {
        let poller = tokio::spawn(self.clone().run_poller(self.shutdown_signal()));
        let updates = tokio::spawn(self.updates.clone().run(self.shutdown_signal()));
        self.tasks.lock().await.extend([poller, updates]);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signals every task and waits for them to finish.
    pub async fn shutdown(&self) {
        self.request_shutdown();
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("background tasks stopped");
    }

    pub async fn latest(&self) -> LatestSnapshot {
        self.latest.read().await.clone()
    }

    /// Asks the poller for an immediate collection.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    pub(crate) async fn store(&self, result: Result<SystemSnapshot, CollectionError>) {
        let mut guard = self.latest.write().await;
        guard.updated_at_unix = now_unix();
        match result {
            Ok(snapshot) => {
                guard.snapshot = Some(snapshot);
                guard.error = None;
            }
            Err(err) => {
                warn!(error = %err, "snapshot collection failed");
                guard.error = Some(err.to_string());
            }
        }
    }

    async fn run_poller(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
                _ = self.refresh.notified() => {
                    debug!("on-demand refresh");
                    ticker.reset();
                }
            }

            // A refresh arriving mid-collection restarts it.
            loop {
                tokio::select! {
                    result = self.collector.collect() => {
                        self.store(result).await;
                        break;
                    }
                    _ = self.refresh.notified() => {
                        debug!("abandoning stale collection");
                    }
                    _ = shutdown.changed() => return,
                }
            }
        }
        info!("snapshot poller stopped");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ticket::tests::{fake_collector, RecordingTransport};
    use crate::update::tests::RecordingInstaller;
    use std::time::Duration;

    pub(crate) fn test_context() -> Arc<AppContext> {
        let config = Config {
            poll_interval_secs: 3600,
            ..Config::default()
        };
        AppContext::assemble(
            config,
            Metrics::new().unwrap(),
            Services {
                collector: fake_collector(),
                mail: Some(Arc::new(RecordingTransport::default())),
                feed: None,
                installer: Arc::new(RecordingInstaller::default()),
                launcher: Arc::new(DetachedLauncher),
            },
        )
        .unwrap()
    }

    async fn wait_for_snapshot(ctx: &AppContext) -> LatestSnapshot {
        for _ in 0..100 {
            let latest = ctx.latest().await;
            if latest.snapshot.is_some() {
                return latest;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("poller never stored a snapshot");
    }

    #[tokio::test]
    async fn poller_stores_first_snapshot_and_stops() {
        let ctx = test_context();
        assert!(ctx.latest().await.snapshot.is_none());

        ctx.start().await;
        let latest = wait_for_snapshot(&ctx).await;
        assert_eq!(latest.snapshot.unwrap().hostname, "desk-01");
        assert!(latest.error.is_none());

        tokio::time::timeout(Duration::from_secs(5), ctx.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_triggers_new_collection() {
        let ctx = test_context();
        ctx.start().await;
        let first = wait_for_snapshot(&ctx).await.updated_at_unix;

        tokio::time::sleep(Duration::from_millis(1100)).await;
        ctx.request_refresh();
        let mut refreshed = false;
        for _ in 0..100 {
            if ctx.latest().await.updated_at_unix > first {
                refreshed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(refreshed);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn failed_collection_keeps_previous_snapshot() {
        let ctx = test_context();
        ctx.store(Ok(crate::normalize::normalize(
            &crate::normalize::tests::blank_probes(),
        )))
        .await;
        ctx.store(Err(CollectionError::Unavailable(
            crate::collectors::ProbeError::Source("provider offline".to_string()),
        )))
        .await;

        let latest = ctx.latest().await;
        assert!(latest.snapshot.is_some());
        assert!(latest.error.unwrap().contains("provider offline"));
    }
}
