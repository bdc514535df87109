use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub remote_support: RemoteSupportConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// SMTP server; tickets are rejected while this is unset.
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub security: SmtpSecurity,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_mail_password_env")]
    pub password_env: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_mail_from")]
    pub from: String,
    #[serde(default = "default_mail_to")]
    pub to: String,
    #[serde(default = "default_mail_timeout_secs")]
    pub timeout_secs: u64,
}

/// `tls` is implicit TLS (SMTPS, usually port 465).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    #[default]
    Tls,
    Starttls,
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_install_delay_secs")]
    pub install_delay_secs: u64,
    #[serde(default)]
    pub allow_prerelease: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteSupportConfig {
    #[serde(default = "default_installed_paths")]
    pub installed_paths: Vec<String>,
    #[serde(default = "default_quick_support_url")]
    pub quick_support_url: String,
    #[serde(default = "default_quick_support_file_name")]
    pub file_name: String,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            poll_interval_secs: default_poll_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            mail: MailConfig::default(),
            update: UpdateConfig::default(),
            remote_support: RemoteSupportConfig::default(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            security: SmtpSecurity::default(),
            accept_invalid_certs: false,
            username: None,
            password_env: default_mail_password_env(),
            password: None,
            from: default_mail_from(),
            to: default_mail_to(),
            timeout_secs: default_mail_timeout_secs(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            feed_url: None,
            initial_delay_secs: default_initial_delay_secs(),
            check_interval_secs: default_check_interval_secs(),
            install_delay_secs: default_install_delay_secs(),
            allow_prerelease: false,
        }
    }
}

impl Default for RemoteSupportConfig {
    fn default() -> Self {
        Self {
            installed_paths: default_installed_paths(),
            quick_support_url: default_quick_support_url(),
            file_name: default_quick_support_file_name(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation("listen is required".to_string()));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.poll_interval_secs < 1 {
            return Err(ConfigError::Validation(
                "poll_interval_secs must be >= 1".to_string(),
            ));
        }
        if self.probe_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "probe_timeout_secs must be >= 1".to_string(),
            ));
        }

        validate_mail(&self.mail)?;
        validate_update(&self.update)?;
        validate_remote_support(&self.remote_support)?;

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

impl MailConfig {
    /// SMTP password from the environment first, then from the file.
    pub fn resolve_password(&self) -> Option<String> {
        if let Ok(v) = std::env::var(&self.password_env) {
            if !v.trim().is_empty() {
                return Some(v.trim().to_string());
            }
        }
        self.password
            .as_ref()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("http://") || url.starts_with("https://")
}

fn validate_mail(cfg: &MailConfig) -> Result<(), ConfigError> {
    if let Some(host) = &cfg.smtp_host {
        let host = host.trim();
        if host.is_empty() || host.contains("://") || host.contains(char::is_whitespace) {
            return Err(ConfigError::Validation(
                "mail.smtp_host must be a bare host name".to_string(),
            ));
        }
    }
    if cfg.smtp_port == 0 {
        return Err(ConfigError::Validation(
            "mail.smtp_port must be > 0".to_string(),
        ));
    }
    if !cfg.from.contains('@') {
        return Err(ConfigError::Validation(
            "mail.from must be an email address".to_string(),
        ));
    }
    if !cfg.to.contains('@') {
        return Err(ConfigError::Validation(
            "mail.to must be an email address".to_string(),
        ));
    }
    if cfg.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "mail.timeout_secs must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_update(cfg: &UpdateConfig) -> Result<(), ConfigError> {
    if !cfg.enabled {
        return Ok(());
    }
    match &cfg.feed_url {
        Some(url) if is_http_url(url) => {}
        _ => {
            return Err(ConfigError::Validation(
                "update.feed_url must be an http(s) URL when updates are enabled".to_string(),
            ))
        }
    }
    if cfg.check_interval_secs < 60 {
        return Err(ConfigError::Validation(
            "update.check_interval_secs must be >= 60".to_string(),
        ));
    }
    Ok(())
}

fn validate_remote_support(cfg: &RemoteSupportConfig) -> Result<(), ConfigError> {
    if !is_http_url(&cfg.quick_support_url) {
        return Err(ConfigError::Validation(
            "remote_support.quick_support_url must be an http(s) URL".to_string(),
        ));
    }
    let name = cfg.file_name.trim();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
        return Err(ConfigError::Validation(
            "remote_support.file_name must be a bare file name".to_string(),
        ));
    }
    if cfg.download_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "remote_support.download_timeout_secs must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn default_listen() -> String {
    "127.0.0.1:9120".to_string()
}

const fn default_poll_interval_secs() -> u64 {
    120
}

const fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_mail_from() -> String {
    "helpdesk@localhost.localdomain".to_string()
}

fn default_mail_to() -> String {
    "support@localhost.localdomain".to_string()
}

const fn default_smtp_port() -> u16 {
    465
}

fn default_mail_password_env() -> String {
    "SUPPORTDESK_SMTP_PASSWORD".to_string()
}

const fn default_mail_timeout_secs() -> u64 {
    30
}

const fn default_initial_delay_secs() -> u64 {
    10
}

const fn default_check_interval_secs() -> u64 {
    4 * 60 * 60
}

const fn default_install_delay_secs() -> u64 {
    5
}

fn default_installed_paths() -> Vec<String> {
    vec![
        r"C:\Program Files\TeamViewer\TeamViewer.exe".to_string(),
        r"C:\Program Files (x86)\TeamViewer\TeamViewer.exe".to_string(),
    ]
}

fn default_quick_support_url() -> String {
    "https://download.teamviewer.com/download/TeamViewerQS.exe".to_string()
}

fn default_quick_support_file_name() -> String {
    "TeamViewerQS.exe".to_string()
}

const fn default_download_timeout_secs() -> u64 {
    120
}
