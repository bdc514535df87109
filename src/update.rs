//! Self-update: feed polling, download with progress and installer hand-off.

use crate::config::UpdateConfig;
use crate::metrics::Metrics;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("updates are disabled")]
    Disabled,
    #[error("update feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("update server answered {0}")]
    Status(u16),
    #[error("invalid update feed: {0}")]
    Feed(#[from] serde_json::Error),
    #[error("invalid version '{0}'")]
    Version(String),
    #[error("update file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot apply '{event}' while {from}")]
    InvalidTransition {
        from: &'static str,
        event: &'static str,
    },
    #[error("no update is available")]
    NoUpdateAvailable,
    #[error("no downloaded update to install")]
    NotDownloaded,
    #[error("failed to launch installer: {0}")]
    Launch(String),
}

/// Latest release as published by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub percent: f64,
    pub transferred: u64,
    pub total: Option<u64>,
    pub bytes_per_second: f64,
}

impl DownloadProgress {
    fn new(transferred: u64, total: Option<u64>, elapsed: Duration) -> Self {
        let percent = match total {
            Some(t) if t > 0 => ((transferred as f64 / t as f64) * 100.0).min(100.0),
            _ => 0.0,
        };
        let secs = elapsed.as_secs_f64();
        Self {
            percent,
            transferred,
            total,
            bytes_per_second: if secs > 0.0 { transferred as f64 / secs } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum UpdateState {
    Idle,
    Checking,
    Available {
        version: String,
        notes: Option<String>,
    },
    Downloading {
        version: String,
        progress: DownloadProgress,
    },
    Downloaded {
        version: String,
        path: PathBuf,
    },
    Installing {
        version: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub enum UpdateEvent {
    CheckStarted,
    UpToDate,
    Found(ReleaseInfo),
    DownloadStarted,
    Progress(DownloadProgress),
    Downloaded(PathBuf),
    InstallStarted,
    Failed(String),
}

impl UpdateEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::CheckStarted => "check",
            Self::UpToDate => "up-to-date",
            Self::Found(_) => "found",
            Self::DownloadStarted => "download",
            Self::Progress(_) => "progress",
            Self::Downloaded(_) => "downloaded",
            Self::InstallStarted => "install",
            Self::Failed(_) => "failed",
        }
    }
}

impl UpdateState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Available { .. } => "available",
            Self::Downloading { .. } => "downloading",
            Self::Downloaded { .. } => "downloaded",
            Self::Installing { .. } => "installing",
            Self::Error { .. } => "error",
        }
    }

    /// Next state for `event`, or an error when the lifecycle does not allow it.
    pub fn apply(&self, event: UpdateEvent) -> Result<UpdateState, UpdateError> {
        use UpdateEvent as E;
        use UpdateState as S;

        let next = match (self, event) {
            (S::Idle | S::Available { .. } | S::Error { .. }, E::CheckStarted) => S::Checking,
            (S::Checking, E::UpToDate) => S::Idle,
            (S::Checking, E::Found(release)) => S::Available {
                version: release.version,
                notes: release.notes,
            },
            (S::Available { version, .. }, E::DownloadStarted) => S::Downloading {
                version: version.clone(),
                progress: DownloadProgress::new(0, None, Duration::ZERO),
            },
            (S::Downloading { version, .. }, E::Progress(progress)) => S::Downloading {
                version: version.clone(),
                progress,
            },
            (S::Downloading { version, .. }, E::Downloaded(path)) => S::Downloaded {
                version: version.clone(),
                path,
            },
            (S::Downloaded { version, .. }, E::InstallStarted) => S::Installing {
                version: version.clone(),
            },
            (S::Installing { .. }, E::Failed(_)) => {
                return Err(UpdateError::InvalidTransition {
                    from: self.name(),
                    event: "failed",
                })
            }
            (_, E::Failed(message)) => S::Error { message },
            (state, event) => {
                return Err(UpdateError::InvalidTransition {
                    from: state.name(),
                    event: event.name(),
                })
            }
        };
        Ok(next)
    }
}

#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
    pre: Option<String>,
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self, UpdateError> {
        let trimmed = raw.trim().trim_start_matches(['v', 'V']);
        let (core, pre) = match trimmed.split_once('-') {
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (trimmed, None),
        };
        let core = core.split('+').next().unwrap_or(core);
        let parts = core
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| UpdateError::Version(raw.to_string()))?;
        if parts.is_empty() {
            return Err(UpdateError::Version(raw.to_string()));
        }
        Ok(Self { parts, pre })
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

/// Whether `candidate` should replace `current`. Never a downgrade.
pub fn is_newer_version(candidate: &str, current: &str, allow_prerelease: bool) -> bool {
    let (Ok(candidate), Ok(current)) = (Version::parse(candidate), Version::parse(current)) else {
        return false;
    };
    if candidate.is_prerelease() && !allow_prerelease {
        return false;
    }
    candidate > current
}

pub type ProgressFn<'a> = dyn Fn(DownloadProgress) + Send + Sync + 'a;

#[async_trait]
pub trait UpdateFeed: Send + Sync {
    async fn latest(&self) -> Result<ReleaseInfo, UpdateError>;
    async fn download(
        &self,
        release: &ReleaseInfo,
        dest: &Path,
        progress: &ProgressFn<'_>,
    ) -> Result<u64, UpdateError>;
}

pub struct HttpUpdateFeed {
    client: Client,
    feed_url: String,
}

impl HttpUpdateFeed {
    pub fn new(feed_url: impl Into<String>) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!("supportdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            feed_url: feed_url.into(),
        })
    }
}

#[async_trait]
impl UpdateFeed for HttpUpdateFeed {
    async fn latest(&self) -> Result<ReleaseInfo, UpdateError> {
        let response = self
            .client
            .get(&self.feed_url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(UpdateError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn download(
        &self,
        release: &ReleaseInfo,
        dest: &Path,
        progress: &ProgressFn<'_>,
    ) -> Result<u64, UpdateError> {
        let mut response = self.client.get(&release.url).send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Status(response.status().as_u16()));
        }
        let total = response.content_length();
        let started = Instant::now();

        let partial = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut transferred = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            transferred += chunk.len() as u64;
            progress(DownloadProgress::new(transferred, total, started.elapsed()));
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, dest).await?;
        Ok(transferred)
    }
}

/// Starts a downloaded installer.
pub trait Installer: Send + Sync {
    fn launch(&self, path: &Path) -> Result<(), UpdateError>;
}

pub struct ProcessInstaller;

impl Installer for ProcessInstaller {
    fn launch(&self, path: &Path) -> Result<(), UpdateError> {
        let is_msi = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("msi"));
        let mut command = if is_msi {
            let mut c = tokio::process::Command::new("msiexec");
            c.arg("/i").arg(path).arg("/passive");
            c
        } else {
            tokio::process::Command::new(path)
        };
        command
            .spawn()
            .map(|_| ())
            .map_err(|e| UpdateError::Launch(format!("{}: {e}", path.display())))
    }
}

pub struct UpdateManager {
    cfg: UpdateConfig,
    feed: Option<Arc<dyn UpdateFeed>>,
    installer: Arc<dyn Installer>,
    current_version: String,
    download_dir: PathBuf,
    state_tx: watch::Sender<UpdateState>,
    pending: Mutex<Option<ReleaseInfo>>,
    shutdown: Arc<watch::Sender<bool>>,
    metrics: Option<Arc<Metrics>>,
}

impl UpdateManager {
    pub fn new(
        cfg: UpdateConfig,
        feed: Option<Arc<dyn UpdateFeed>>,
        installer: Arc<dyn Installer>,
        shutdown: Arc<watch::Sender<bool>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(UpdateState::Idle);
        Self {
            cfg,
            feed,
            installer,
            current_version: CURRENT_VERSION.to_string(),
            download_dir: std::env::temp_dir().join("supportdesk-updates"),
            state_tx,
            pending: Mutex::new(None),
            shutdown,
            metrics: None,
        }
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn state(&self) -> UpdateState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UpdateState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, event: UpdateEvent) -> Result<UpdateState, UpdateError> {
        let mut result = Err(UpdateError::Disabled);
        self.state_tx.send_if_modified(|state| match state.apply(event) {
            Ok(next) => {
                *state = next.clone();
                result = Ok(next);
                true
            }
            Err(err) => {
                result = Err(err);
                false
            }
        });
        result
    }

    fn count(&self, event: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_update_event(event);
        }
    }

    fn fail(&self, err: UpdateError) -> UpdateError {
        self.count("error");
        if let Err(transition_err) = self.transition(UpdateEvent::Failed(err.to_string())) {
            debug!(error = %transition_err, "update failure not recorded in state");
        }
        err
    }

    fn feed(&self) -> Result<&Arc<dyn UpdateFeed>, UpdateError> {
        match (&self.feed, self.cfg.enabled) {
            (Some(feed), true) => Ok(feed),
            _ => Err(UpdateError::Disabled),
        }
    }

    /// Asks the feed for a newer release. `Ok(None)` means up to date.
    pub async fn check(&self) -> Result<Option<ReleaseInfo>, UpdateError> {
        let feed = self.feed()?;
        self.transition(UpdateEvent::CheckStarted)?;
        self.count("check");

        let release = match feed.latest().await {
            Ok(release) => release,
            Err(err) => return Err(self.fail(err)),
        };
        if let Err(err) = Version::parse(&release.version) {
            return Err(self.fail(err));
        }

        if is_newer_version(
            &release.version,
            &self.current_version,
            self.cfg.allow_prerelease,
        ) {
            info!(
                current = %self.current_version,
                available = %release.version,
                "update available"
            );
            *self.pending.lock().await = Some(release.clone());
            self.transition(UpdateEvent::Found(release.clone()))?;
            self.count("available");
            Ok(Some(release))
        } else {
            debug!(
                current = %self.current_version,
                latest = %release.version,
                "no newer release"
            );
            self.transition(UpdateEvent::UpToDate)?;
            Ok(None)
        }
    }

    /// Downloads the release found by the last check into the download directory.
    pub async fn download(&self) -> Result<PathBuf, UpdateError> {
        let feed = self.feed()?;
        let release = self
            .pending
            .lock()
            .await
            .clone()
            .ok_or(UpdateError::NoUpdateAvailable)?;
        self.transition(UpdateEvent::DownloadStarted)?;

        if let Err(err) = tokio::fs::create_dir_all(&self.download_dir).await {
            return Err(self.fail(err.into()));
        }
        let dest = self
            .download_dir
            .join(installer_file_name(&release.url, &release.version));

        let report = |progress: DownloadProgress| {
            if let Err(err) = self.transition(UpdateEvent::Progress(progress)) {
                debug!(error = %err, "progress dropped");
            }
        };
        match feed.download(&release, &dest, &report).await {
            Ok(bytes) => {
                info!(path = %dest.display(), bytes, "update downloaded");
                self.transition(UpdateEvent::Downloaded(dest.clone()))?;
                self.count("downloaded");
                Ok(dest)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Launches the downloaded installer after the configured delay, then
    /// asks the process to shut down.
    pub async fn install(&self) -> Result<(), UpdateError> {
        let path = match self.state() {
            UpdateState::Downloaded { path, .. } => path,
            _ => return Err(UpdateError::NotDownloaded),
        };
        self.transition(UpdateEvent::InstallStarted)?;
        self.count("install");

        tokio::time::sleep(Duration::from_secs(self.cfg.install_delay_secs)).await;
        info!(path = %path.display(), "launching installer");
        if let Err(err) = self.installer.launch(&path) {
            error!(error = %err, "installer did not start");
            // Installing accepts no further events; reopen the lifecycle.
            self.state_tx.send_replace(UpdateState::Error {
                message: err.to_string(),
            });
            self.count("error");
            return Err(err);
        }
        let _ = self.shutdown.send(true);
        Ok(())
    }

    /// Download followed by install, as triggered from the UI.
    pub async fn download_and_install(&self) -> Result<(), UpdateError> {
        self.download().await?;
        self.install().await
    }

    /// Periodic checks until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if self.feed().is_err() {
            info!("automatic updates disabled");
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(self.cfg.initial_delay_secs)) => {}
            _ = shutdown.changed() => return,
        }

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.cfg.check_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.check().await {
                        Ok(_) => {}
                        Err(UpdateError::InvalidTransition { from, .. }) => {
                            debug!(state = from, "skipping scheduled update check");
                        }
                        Err(err) => warn!(error = %err, "update check failed"),
                    }
                }
            }
        }
    }
}

/// Last URL path segment restricted to safe characters.
fn installer_file_name(url: &str, version: &str) -> String {
    let segment = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let cleaned: String = segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.is_empty() || cleaned.starts_with('.') {
        format!("supportdesk-{version}-setup.exe")
    } else {
        cleaned
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::CONTENT_LENGTH;
    use axum::response::Response;
    use axum::routing::get;
    use axum::Router;
    use std::sync::Mutex as StdMutex;
    use tokio::net::TcpListener;

    pub(crate) struct StaticFeed {
        pub(crate) release: Option<ReleaseInfo>,
        pub(crate) payload: Vec<u8>,
    }

    impl StaticFeed {
        pub(crate) fn offering(version: &str) -> Self {
            Self {
                release: Some(ReleaseInfo {
                    version: version.to_string(),
                    url: "https://updates.example.com/files/SupportDesk-Setup.exe".to_string(),
                    notes: Some("Bug fixes".to_string()),
                }),
                payload: vec![7u8; 4096],
            }
        }
    }

    #[async_trait]
    impl UpdateFeed for StaticFeed {
        async fn latest(&self) -> Result<ReleaseInfo, UpdateError> {
            self.release.clone().ok_or(UpdateError::Status(404))
        }

        async fn download(
            &self,
            _release: &ReleaseInfo,
            dest: &Path,
            progress: &ProgressFn<'_>,
        ) -> Result<u64, UpdateError> {
            let total = self.payload.len() as u64;
            for (i, _) in self.payload.chunks(1024).enumerate() {
                let done = ((i as u64 + 1) * 1024).min(total);
                progress(DownloadProgress::new(done, Some(total), Duration::from_millis(10)));
            }
            tokio::fs::write(dest, &self.payload).await?;
            Ok(total)
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingInstaller {
        pub(crate) launched: StdMutex<Vec<PathBuf>>,
    }

    impl Installer for RecordingInstaller {
        fn launch(&self, path: &Path) -> Result<(), UpdateError> {
            self.launched.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn enabled() -> UpdateConfig {
        UpdateConfig {
            enabled: true,
            feed_url: Some("https://updates.example.com/latest.json".to_string()),
            install_delay_secs: 0,
            ..UpdateConfig::default()
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("supportdesk-{name}-{}", std::process::id()))
    }

    pub(crate) fn manager_with(
        feed: StaticFeed,
        installer: Arc<RecordingInstaller>,
        shutdown: Arc<watch::Sender<bool>>,
        dir: &str,
    ) -> UpdateManager {
        UpdateManager::new(enabled(), Some(Arc::new(feed)), installer, shutdown)
            .with_current_version("1.0.0")
            .with_download_dir(scratch_dir(dir))
    }

    #[test]
    fn version_ordering() {
        assert!(is_newer_version("1.0.1", "1.0.0", false));
        assert!(is_newer_version("v1.10.0", "1.9.9", false));
        assert!(is_newer_version("2", "1.9", false));
        assert!(!is_newer_version("1.0.0", "1.0.0", false));
        assert!(!is_newer_version("0.9.9", "1.0.0", false));
        assert!(!is_newer_version("1.0", "1.0.0", false));
        assert!(!is_newer_version("1.1.0-beta.1", "1.0.0", false));
        assert!(is_newer_version("1.1.0-beta.1", "1.0.0", true));
        assert!(is_newer_version("1.1.0", "1.1.0-beta.2", false));
        assert!(!is_newer_version("garbage", "1.0.0", true));
    }

    #[test]
    fn lifecycle_transitions() {
        let release = ReleaseInfo {
            version: "1.2.0".to_string(),
            url: "https://x/y.exe".to_string(),
            notes: None,
        };
        let s = UpdateState::Idle.apply(UpdateEvent::CheckStarted).unwrap();
        assert_eq!(s, UpdateState::Checking);
        assert_eq!(s.apply(UpdateEvent::UpToDate).unwrap(), UpdateState::Idle);

        let s = s.apply(UpdateEvent::Found(release)).unwrap();
        assert_eq!(s.name(), "available");
        let s = s.apply(UpdateEvent::DownloadStarted).unwrap();
        let s = s
            .apply(UpdateEvent::Progress(DownloadProgress::new(5, Some(10), Duration::from_secs(1))))
            .unwrap();
        match &s {
            UpdateState::Downloading { progress, .. } => assert_eq!(progress.percent, 50.0),
            other => panic!("unexpected {other:?}"),
        }
        let s = s.apply(UpdateEvent::Downloaded(PathBuf::from("/tmp/x.exe"))).unwrap();
        let s = s.apply(UpdateEvent::InstallStarted).unwrap();
        assert_eq!(s.name(), "installing");

        assert!(matches!(
            UpdateState::Idle.apply(UpdateEvent::InstallStarted),
            Err(UpdateError::InvalidTransition { from: "idle", event: "install" })
        ));
        assert!(s.apply(UpdateEvent::CheckStarted).is_err());
        assert!(s.apply(UpdateEvent::Failed("x".to_string())).is_err());
        let err = UpdateState::Checking
            .apply(UpdateEvent::Failed("feed down".to_string()))
            .unwrap();
        assert_eq!(err.apply(UpdateEvent::CheckStarted).unwrap(), UpdateState::Checking);
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(UpdateState::Available {
            version: "1.2.0".to_string(),
            notes: None,
        })
        .unwrap();
        assert_eq!(json["state"], "available");
        assert_eq!(json["version"], "1.2.0");
    }

    #[test]
    fn installer_names_are_sanitized() {
        assert_eq!(
            installer_file_name("https://h/dl/SupportDesk-Setup-1.2.0.exe?token=abc", "1.2.0"),
            "SupportDesk-Setup-1.2.0.exe"
        );
        assert_eq!(installer_file_name("https://h/dl/", "1.2.0"), "supportdesk-1.2.0-setup.exe");
        assert_eq!(installer_file_name("https://h/..", "2.0"), "supportdesk-2.0-setup.exe");
    }

    #[tokio::test]
    async fn check_download_install() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let installer = Arc::new(RecordingInstaller::default());
        let manager = manager_with(
            StaticFeed::offering("1.2.0"),
            installer.clone(),
            Arc::new(shutdown_tx),
            "flow",
        );
        let states = manager.subscribe();

        let found = manager.check().await.unwrap().expect("newer release");
        assert_eq!(found.version, "1.2.0");
        assert_eq!(states.borrow().name(), "available");

        let path = manager.download().await.unwrap();
        assert!(path.ends_with("SupportDesk-Setup.exe"));
        assert_eq!(tokio::fs::read(&path).await.unwrap().len(), 4096);

        manager.install().await.unwrap();
        assert_eq!(installer.launched.lock().unwrap().as_slice(), &[path.clone()]);
        assert!(*shutdown_rx.borrow());
        assert_eq!(manager.state().name(), "installing");
        let _ = tokio::fs::remove_dir_all(scratch_dir("flow")).await;
    }

    #[tokio::test]
    async fn up_to_date_and_failures() {
        let (shutdown_tx, _rx) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);
        let installer = Arc::new(RecordingInstaller::default());

        let manager = manager_with(StaticFeed::offering("1.0.0"), installer.clone(), shutdown.clone(), "same");
        assert!(manager.check().await.unwrap().is_none());
        assert_eq!(manager.state(), UpdateState::Idle);
        assert!(matches!(manager.download().await, Err(UpdateError::NoUpdateAvailable)));
        assert!(matches!(manager.install().await, Err(UpdateError::NotDownloaded)));

        let broken = StaticFeed {
            release: None,
            payload: Vec::new(),
        };
        let manager = manager_with(broken, installer.clone(), shutdown.clone(), "broken");
        assert!(manager.check().await.is_err());
        assert_eq!(manager.state().name(), "error");

        let disabled = UpdateManager::new(UpdateConfig::default(), None, installer, shutdown);
        assert!(matches!(disabled.check().await, Err(UpdateError::Disabled)));
    }

    #[tokio::test]
    async fn http_feed_streams_with_progress() {
        let payload = vec![1u8; 64 * 1024];
        let body = payload.clone();
        let app = Router::new()
            .route(
                "/latest.json",
                get(|| async { r#"{"version":"3.1.4","url":"PLACEHOLDER","notes":"n"}"# }),
            )
            .route(
                "/setup.exe",
                get(move || {
                    let body = body.clone();
                    async move {
                        Response::builder()
                            .header(CONTENT_LENGTH, body.len())
                            .body(Body::from(body))
                            .unwrap()
                    }
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let feed = HttpUpdateFeed::new(format!("http://{addr}/latest.json")).unwrap();
        let mut release = feed.latest().await.unwrap();
        assert_eq!(release.version, "3.1.4");
        release.url = format!("http://{addr}/setup.exe");

        let dir = scratch_dir("http");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let dest = dir.join("setup.exe");
        let seen = StdMutex::new(Vec::new());
        let report = |p: DownloadProgress| seen.lock().unwrap().push(p);
        let bytes = feed.download(&release, &dest, &report).await.unwrap();

        assert_eq!(bytes, payload.len() as u64);
        let seen = seen.lock().unwrap();
        let last = seen.last().expect("progress reported");
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.total, Some(payload.len() as u64));
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), payload);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
