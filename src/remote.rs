use crate::config::RemoteSupportConfig;
use crate::metrics::Metrics;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RemoteSupportError {
    #[error("failed to download remote support client: {0}")]
    Download(#[from] reqwest::Error),
    #[error("remote support download answered {0}")]
    Status(u16),
    #[error("failed to save remote support client: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to launch {path}: {source}")]
    Launch {
        path: String,
        source: std::io::Error,
    },
}

/// What the UI is told after a launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteSupportLaunch {
    pub installed: bool,
    pub path: String,
}

pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, path: &Path) -> std::io::Result<()>;
}

/// Spawns the program and leaves it running on its own.
pub struct DetachedLauncher;

impl ProcessLauncher for DetachedLauncher {
    fn launch(&self, path: &Path) -> std::io::Result<()> {
        tokio::process::Command::new(path).spawn().map(|_| ())
    }
}

pub struct RemoteSupport {
    cfg: RemoteSupportConfig,
    client: Client,
    launcher: Arc<dyn ProcessLauncher>,
    download_dir: PathBuf,
    metrics: Option<Arc<Metrics>>,
}

impl RemoteSupport {
    pub fn new(
        cfg: RemoteSupportConfig,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self, RemoteSupportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.download_timeout_secs))
            .user_agent(concat!("supportdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            cfg,
            client,
            launcher,
            download_dir: std::env::temp_dir(),
            metrics: None,
        })
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Starts the installed client, or downloads and starts the quick-support one.
    pub async fn launch(&self) -> Result<RemoteSupportLaunch, RemoteSupportError> {
        let (installed, path) = match self.installed_client().await {
            Some(path) => (true, path),
            None => (false, self.download().await?),
        };

        self.launcher
            .launch(&path)
            .map_err(|source| RemoteSupportError::Launch {
                path: path.display().to_string(),
                source,
            })?;

        let method = if installed { "installed" } else { "downloaded" };
        if let Some(metrics) = &self.metrics {
            metrics.inc_remote_support(method);
        }
        info!(path = %path.display(), method, "remote support started");
        Ok(RemoteSupportLaunch {
            installed,
            path: path.display().to_string(),
        })
    }

    async fn installed_client(&self) -> Option<PathBuf> {
        for candidate in &self.cfg.installed_paths {
            let path = PathBuf::from(candidate);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }

    async fn download(&self) -> Result<PathBuf, RemoteSupportError> {
        let dest = self.download_dir.join(&self.cfg.file_name);
        info!(url = %self.cfg.quick_support_url, "downloading remote support client");

        let mut response = self.client.get(&self.cfg.quick_support_url).send().await?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "remote support download rejected");
            return Err(RemoteSupportError::Status(response.status().as_u16()));
        }
        let mut file = tokio::fs::File::create(&dest).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<PathBuf>>,
    }

    impl ProcessLauncher for RecordingLauncher {
        fn launch(&self, path: &Path) -> std::io::Result<()> {
            self.launched.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("supportdesk-remote-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn prefers_installed_client() {
        let dir = scratch_dir("installed");
        let installed = dir.join("TeamViewer.exe");
        std::fs::write(&installed, b"MZ").unwrap();

        let cfg = RemoteSupportConfig {
            installed_paths: vec![
                dir.join("missing.exe").display().to_string(),
                installed.display().to_string(),
            ],
            quick_support_url: "http://127.0.0.1:9/never".to_string(),
            ..RemoteSupportConfig::default()
        };
        let launcher = Arc::new(RecordingLauncher::default());
        let remote = RemoteSupport::new(cfg, launcher.clone()).unwrap();

        let result = remote.launch().await.unwrap();
        assert!(result.installed);
        assert_eq!(result.path, installed.display().to_string());
        assert_eq!(launcher.launched.lock().unwrap().as_slice(), &[installed]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn downloads_quick_support_when_not_installed() {
        let base = serve(Router::new().route("/qs.exe", get(|| async { "quick-support-bytes" }))).await;
        let dir = scratch_dir("download");
        let cfg = RemoteSupportConfig {
            installed_paths: vec![dir.join("absent.exe").display().to_string()],
            quick_support_url: format!("{base}/qs.exe"),
            file_name: "QS.exe".to_string(),
            download_timeout_secs: 5,
        };
        let launcher = Arc::new(RecordingLauncher::default());
        let remote = RemoteSupport::new(cfg, launcher.clone())
            .unwrap()
            .with_download_dir(&dir);

        let result = remote.launch().await.unwrap();
        assert!(!result.installed);
        let saved = dir.join("QS.exe");
        assert_eq!(result.path, saved.display().to_string());
        assert_eq!(std::fs::read(&saved).unwrap(), b"quick-support-bytes");
        assert_eq!(launcher.launched.lock().unwrap().len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn failed_download_does_not_launch() {
        let base = serve(Router::new().route(
            "/qs.exe",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        ))
        .await;
        let dir = scratch_dir("missing");
        let cfg = RemoteSupportConfig {
            installed_paths: Vec::new(),
            quick_support_url: format!("{base}/qs.exe"),
            ..RemoteSupportConfig::default()
        };
        let launcher = Arc::new(RecordingLauncher::default());
        let remote = RemoteSupport::new(cfg, launcher.clone())
            .unwrap()
            .with_download_dir(&dir);

        assert!(matches!(
            remote.launch().await,
            Err(RemoteSupportError::Status(404))
        ));
        assert!(launcher.launched.lock().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }
}
