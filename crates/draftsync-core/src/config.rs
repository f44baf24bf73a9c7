//! Configuration module for draftsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for draftsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
    pub store: StoreConfig,
    pub connectivity: ConnectivityConfig,
    pub logging: LoggingConfig,
}

/// Orchestration settings: chunking, retries and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Chunk size used when there are no recent failures.
    pub chunk_size_base: usize,
    /// Smallest chunk size adaptive chunking may shrink to.
    pub chunk_size_min: usize,
    /// Largest chunk size adaptive chunking may use.
    pub chunk_size_max: usize,
    /// Upload attempts per chunk, including the first one.
    pub max_retry_attempts: u32,
    /// Backoff before the first retry, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Upper bound for any single backoff, in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Upper bound on the duration of a whole run, in seconds.
    pub watchdog_timeout_secs: u64,
    /// Timeout for one chunk upload, in seconds.
    pub chunk_timeout_secs: u64,
    /// Timeout for the connection liveness probe, in seconds.
    pub validation_timeout_secs: u64,
    /// Timeout for pulling remote updates, in seconds.
    pub download_timeout_secs: u64,
    /// How long the final 100% progress stays visible, in milliseconds.
    pub progress_grace_ms: u64,
    /// Start a run automatically when connectivity comes back.
    pub auto_resume: bool,
    /// Seconds between periodic queue checks in the daemon.
    pub poll_interval_secs: u64,
}

/// Remote system of record settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the remote server, e.g. `https://play.example.org`.
    pub base_url: String,
    /// Account name shown in status output.
    pub username: Option<String>,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    /// Timeout applied to every HTTP request, in seconds.
    pub request_timeout_secs: u64,
}

/// Local draft store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database holding drafts.
    pub database: PathBuf,
}

/// Connectivity probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Host the probe connects to. Empty means "derive from remote.base_url".
    pub probe_host: String,
    /// TCP port the probe connects to.
    pub probe_port: u16,
    /// Seconds between probes.
    pub probe_interval_secs: u64,
    /// Timeout for a single probe, in seconds.
    pub probe_timeout_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/draftsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("draftsync")
            .join("config.yaml")
    }

    /// Serialize the configuration back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl SyncConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_secs(self.watchdog_timeout_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn progress_grace(&self) -> Duration {
        Duration::from_millis(self.progress_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl ConnectivityConfig {
    /// Resolve the probe host, falling back to the remote base URL's host.
    pub fn resolved_host(&self, remote: &RemoteConfig) -> Option<String> {
        if !self.probe_host.is_empty() {
            return Some(self.probe_host.clone());
        }
        let rest = remote
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&remote.base_url);
        let authority = rest.split('/').next().unwrap_or_default();
        let host = authority.split(':').next().unwrap_or_default();
        (!host.is_empty()).then(|| host.to_string())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size_base: 30,
            chunk_size_min: 5,
            chunk_size_max: 100,
            max_retry_attempts: 3,
            retry_base_delay_ms: 2_000,
            retry_max_delay_ms: 30_000,
            watchdog_timeout_secs: 600,
            chunk_timeout_secs: 120,
            validation_timeout_secs: 15,
            download_timeout_secs: 180,
            progress_grace_ms: 2_000,
            auto_resume: true,
            poll_interval_secs: 300,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost:8080".to_string(),
            username: None,
            token_env: "DRAFTSYNC_TOKEN".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("draftsync")
                .join("drafts.db"),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_host: String::new(),
            probe_port: 443,
            probe_interval_secs: 15,
            probe_timeout_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.chunk_size_min"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let sync = &self.sync;

        // --- sync ---
        positive(&mut errors, "sync.chunk_size_base", sync.chunk_size_base as u64);
        positive(&mut errors, "sync.chunk_size_min", sync.chunk_size_min as u64);
        positive(&mut errors, "sync.chunk_size_max", sync.chunk_size_max as u64);
        if sync.chunk_size_min > sync.chunk_size_base {
            errors.push(ValidationError {
                field: "sync.chunk_size_min".into(),
                message: format!(
                    "chunk_size_min ({}) must not exceed chunk_size_base ({})",
                    sync.chunk_size_min, sync.chunk_size_base
                ),
            });
        }
        if sync.chunk_size_base > sync.chunk_size_max {
            errors.push(ValidationError {
                field: "sync.chunk_size_base".into(),
                message: format!(
                    "chunk_size_base ({}) must not exceed chunk_size_max ({})",
                    sync.chunk_size_base, sync.chunk_size_max
                ),
            });
        }
        positive(
            &mut errors,
            "sync.max_retry_attempts",
            sync.max_retry_attempts as u64,
        );
        positive(&mut errors, "sync.retry_base_delay_ms", sync.retry_base_delay_ms);
        if sync.retry_base_delay_ms > sync.retry_max_delay_ms {
            errors.push(ValidationError {
                field: "sync.retry_max_delay_ms".into(),
                message: format!(
                    "retry_max_delay_ms ({}) must be at least retry_base_delay_ms ({})",
                    sync.retry_max_delay_ms, sync.retry_base_delay_ms
                ),
            });
        }
        positive(&mut errors, "sync.watchdog_timeout_secs", sync.watchdog_timeout_secs);
        positive(&mut errors, "sync.chunk_timeout_secs", sync.chunk_timeout_secs);
        positive(
            &mut errors,
            "sync.validation_timeout_secs",
            sync.validation_timeout_secs,
        );
        positive(&mut errors, "sync.download_timeout_secs", sync.download_timeout_secs);
        positive(&mut errors, "sync.poll_interval_secs", sync.poll_interval_secs);

        // --- remote ---
        if self.remote.base_url.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: "must not be empty".into(),
            });
        } else if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL: {}", self.remote.base_url),
            });
        }
        if self.remote.token_env.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.token_env".into(),
                message: "must not be empty".into(),
            });
        }
        positive(
            &mut errors,
            "remote.request_timeout_secs",
            self.remote.request_timeout_secs,
        );

        // --- connectivity ---
        positive(
            &mut errors,
            "connectivity.probe_port",
            self.connectivity.probe_port as u64,
        );
        positive(
            &mut errors,
            "connectivity.probe_interval_secs",
            self.connectivity.probe_interval_secs,
        );
        positive(
            &mut errors,
            "connectivity.probe_timeout_secs",
            self.connectivity.probe_timeout_secs,
        );

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use draftsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .remote_base_url("https://play.example.org")
///     .chunk_sizes(5, 30, 100)
///     .max_retry_attempts(2)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn chunk_sizes(mut self, min: usize, base: usize, max: usize) -> Self {
        self.config.sync.chunk_size_min = min;
        self.config.sync.chunk_size_base = base;
        self.config.sync.chunk_size_max = max;
        self
    }

    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.sync.max_retry_attempts = attempts;
        self
    }

    pub fn retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.sync.retry_base_delay_ms = base;
        self.config.sync.retry_max_delay_ms = max;
        self
    }

    pub fn watchdog_timeout_secs(mut self, secs: u64) -> Self {
        self.config.sync.watchdog_timeout_secs = secs;
        self
    }

    pub fn chunk_timeout_secs(mut self, secs: u64) -> Self {
        self.config.sync.chunk_timeout_secs = secs;
        self
    }

    pub fn validation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.sync.validation_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.sync.download_timeout_secs = secs;
        self
    }

    pub fn progress_grace_ms(mut self, ms: u64) -> Self {
        self.config.sync.progress_grace_ms = ms;
        self
    }

    pub fn auto_resume(mut self, enabled: bool) -> Self {
        self.config.sync.auto_resume = enabled;
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.sync.poll_interval_secs = secs;
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_username(mut self, username: impl Into<String>) -> Self {
        self.config.remote.username = Some(username.into());
        self
    }

    pub fn remote_token_env(mut self, var: impl Into<String>) -> Self {
        self.config.remote.token_env = var.into();
        self
    }

    // --- store ---

    pub fn store_database(mut self, path: PathBuf) -> Self {
        self.config.store.database = path;
        self
    }

    // --- connectivity ---

    pub fn probe_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.connectivity.probe_host = host.into();
        self.config.connectivity.probe_port = port;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
