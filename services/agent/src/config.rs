//! Configuration for the file-sync agent.
//!
//! Loaded once at startup from optional config files and `AGENT__*`
//! environment variables, validated, and then shared read-only with every
//! component for the lifetime of the process.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the agent
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Watched directory configuration
    pub watch: WatchConfig,
    /// Upload endpoint configuration
    pub endpoint: EndpointConfig,
    /// Dedup state configuration
    #[serde(default)]
    pub state: StateConfig,
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Prometheus exporter port (exporter disabled when unset)
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Optional file that log lines are appended to, in addition to stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Watched directory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Directory containing the readiness marker and candidate files
    pub path: PathBuf,
    /// Name of the readiness marker file
    #[serde(default = "default_ready_file")]
    pub ready_file: String,
    /// Required file name prefix for candidates
    pub file_prefix: String,
    /// Required file name extension for candidates (including the dot)
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

/// Upload endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint URL receiving the POST
    pub url: String,
    /// Opaque credential sent verbatim as the Authorization header
    pub api_key: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Dedup state configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// File holding the last transmitted fingerprint
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "filesync-agent".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_ready_file() -> String {
    "READY".to_string()
}

fn default_file_extension() -> String {
    ".json".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state/last_hash.txt")
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            metrics_port: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from config files and environment
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/agent").required(false))
            .add_source(config::File::with_name("/etc/filesync/agent").required(false))
            // AGENT__ENDPOINT__URL -> endpoint.url
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.watch.path.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField("watch.path".to_string()));
        }

        if self.watch.ready_file.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "watch.ready_file".to_string(),
            ));
        }

        if self.endpoint.url.is_empty() {
            return Err(ConfigValidationError::MissingField("endpoint.url".to_string()));
        }
        if !self.endpoint.url.starts_with("http://") && !self.endpoint.url.starts_with("https://")
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "endpoint.url".to_string(),
                message: "URL must start with http:// or https://".to_string(),
            });
        }

        if self.endpoint.api_key.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "endpoint.api_key".to_string(),
            ));
        }

        if self.endpoint.timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "endpoint.timeout_ms".to_string(),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "scheduler.poll_interval_secs".to_string(),
                message: "Poll interval must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Full path of the readiness marker
    pub fn marker_path(&self) -> PathBuf {
        self.watch.path.join(&self.watch.ready_file)
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs)
    }
}

impl EndpointConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
