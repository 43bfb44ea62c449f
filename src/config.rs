//! Configuration management for proxtop

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::{ProxtopError, Result};
use crate::models::Timeframe;

/// Default Proxmox API port
pub const DEFAULT_PORT: u16 = 8006;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cluster connection settings
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Display settings
    #[serde(default)]
    pub display: DisplayConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cluster connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// API host name or address
    pub host: Option<String>,
    /// API port
    pub port: u16,
    /// User name, e.g. `monitor@pve`
    pub username: Option<String>,
    /// Password for ticket authentication
    pub password: Option<String>,
    /// API token id, e.g. `monitor@pve!proxtop`
    pub token_id: Option<String>,
    /// API token secret
    pub token_secret: Option<String>,
    /// Verify the server certificate
    pub verify_tls: bool,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// HTTP timeout in seconds
    pub timeout: u64,
    /// Retries for transient failures
    pub retries: u32,
    /// Initial retry backoff in milliseconds
    pub retry_backoff_ms: u64,
    /// Maximum concurrent RRD requests
    pub concurrency: usize,
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Default RRD timeframe
    pub timeframe: Timeframe,
    /// Rows per metric
    pub limit: usize,
    /// Refresh interval of `watch` in seconds
    pub interval: u64,
    /// Enable colored output
    pub color: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            username: None,
            password: None,
            token_id: None,
            token_secret: None,
            verify_tls: true,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            retries: 2,
            retry_backoff_ms: 500,
            concurrency: 8,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::Hour,
            limit: 10,
            interval: 10,
            color: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClusterConfig {
    /// Base URL of the JSON API
    pub fn base_url(&self) -> Result<String> {
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ProxtopError::config("No cluster host configured (use --host or cluster.host)"))?;
        let host = host
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        Ok(format!("https://{}:{}/api2/json", host, self.port))
    }
}

impl Config {
    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ProxtopError::config("Could not find config directory"))?;
        Ok(config_dir.join("proxtop").join("config.toml"))
    }

    /// Resolve an explicit path or fall back to the default one
    pub fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(p.to_path_buf()),
            None => Self::config_path(),
        }
    }

    /// Load configuration from file; a missing file yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(path)?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file. The file may hold credentials, so it is
    /// only readable by its owner.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = Self::resolve_path(path)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ProxtopError::Config(e.to_string()))?;
        write_private(&path, content.as_bytes())?;

        Ok(())
    }

    /// Reset configuration to defaults
    pub fn reset(path: Option<&Path>) -> Result<()> {
        Self::default().save(path)
    }

    /// Initialize configuration file
    pub fn init(path: Option<&Path>, force: bool) -> Result<()> {
        let resolved = Self::resolve_path(path)?;

        if resolved.exists() && !force {
            return Err(ProxtopError::Config(
                "Configuration file already exists. Use --force to overwrite.".into(),
            ));
        }

        Self::default().save(Some(resolved.as_path()))
    }

    /// Take secrets from the environment when present
    pub fn apply_env(&mut self) {
        if let Ok(password) = std::env::var("PROXTOP_PASSWORD") {
            if !password.is_empty() {
                self.cluster.password = Some(password);
            }
        }
        if let Ok(secret) = std::env::var("PROXTOP_TOKEN_SECRET") {
            if !secret.is_empty() {
                self.cluster.token_secret = Some(secret);
            }
        }
    }

    /// Copy of the configuration with secrets masked, for display
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if copy.cluster.password.is_some() {
            copy.cluster.password = Some("********".into());
        }
        if copy.cluster.token_secret.is_some() {
            copy.cluster.token_secret = Some("********".into());
        }
        copy
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "cluster.host" => self.cluster.host.clone(),
            "cluster.port" => Some(self.cluster.port.to_string()),
            "cluster.username" => self.cluster.username.clone(),
            "cluster.password" => self.cluster.password.as_ref().map(|_| "********".to_string()),
            "cluster.token_id" => self.cluster.token_id.clone(),
            "cluster.token_secret" => self.cluster.token_secret.as_ref().map(|_| "********".to_string()),
            "cluster.verify_tls" => Some(self.cluster.verify_tls.to_string()),

            "network.timeout" => Some(self.network.timeout.to_string()),
            "network.retries" => Some(self.network.retries.to_string()),
            "network.retry_backoff_ms" => Some(self.network.retry_backoff_ms.to_string()),
            "network.concurrency" => Some(self.network.concurrency.to_string()),

            "display.timeframe" => Some(self.display.timeframe.to_string()),
            "display.limit" => Some(self.display.limit.to_string()),
            "display.interval" => Some(self.display.interval.to_string()),
            "display.color" => Some(self.display.color.to_string()),

            "logging.level" => Some(self.logging.level.clone()),

            _ => None,
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "cluster.host" => self.cluster.host = optional(value),
            "cluster.port" => self.cluster.port = parse(key, value)?,
            "cluster.username" => self.cluster.username = optional(value),
            "cluster.password" => self.cluster.password = optional(value),
            "cluster.token_id" => self.cluster.token_id = optional(value),
            "cluster.token_secret" => self.cluster.token_secret = optional(value),
            "cluster.verify_tls" => self.cluster.verify_tls = parse(key, value)?,

            "network.timeout" => self.network.timeout = parse(key, value)?,
            "network.retries" => self.network.retries = parse(key, value)?,
            "network.retry_backoff_ms" => self.network.retry_backoff_ms = parse(key, value)?,
            "network.concurrency" => {
                let concurrency: usize = parse(key, value)?;
                if concurrency == 0 {
                    return Err(ProxtopError::Config("network.concurrency must be at least 1".into()));
                }
                self.network.concurrency = concurrency;
            }

            "display.timeframe" => self.display.timeframe = value.parse()?,
            "display.limit" => self.display.limit = parse(key, value)?,
            "display.interval" => {
                let interval: u64 = parse(key, value)?;
                if interval == 0 {
                    return Err(ProxtopError::Config("display.interval must be at least 1".into()));
                }
                self.display.interval = interval;
            }
            "display.color" => self.display.color = parse(key, value)?,

            "logging.level" => self.logging.level = value.to_string(),

            _ => {
                return Err(ProxtopError::Config(format!("Unknown configuration key: {}", key)));
            }
        }

        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies when the file is created
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(content)
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, content)
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ProxtopError::Config(format!("Invalid value for {}: {}", key, value)))
}
