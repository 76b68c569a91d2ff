//! TOML configuration for one table controller.
//!
//! The file is read once at startup into an [`AppConfig`] that is handed to
//! each component's constructor.  Nothing reads configuration after that.
//!
//! # Example
//!
//! ```toml
//! [table]
//! table_id = "RL-01"
//! game_type = "roulette"
//! device_name = "wheel-hall-a-01"
//! environment = "production"
//!
//! [transport]
//! kind = "serial"
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [remote]
//! server_url = "wss://studio.example.net/tables"
//! token = "secret"
//!
//! [policy]
//! malformed_budget = 3
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the key is absent.  Only the table identity, the
//! transport location and the Studio URL are required; everything else has a
//! documented default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use table_core::{GamePolicy, GameType, Severity, TableSession};

use crate::infrastructure::transport::backoff::BackoffPolicy;
use crate::infrastructure::transport::hid::HidConfig;
use crate::infrastructure::transport::mqtt::MqttConfig;
use crate::infrastructure::transport::serial::SerialConfig;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file parsed but a value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub table: TableConfig,
    pub transport: TransportConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Identity of the table this process drives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableConfig {
    pub table_id: String,
    pub game_type: GameType,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Reported to the external alert channel (`production`, `staging`, ...).
    #[serde(default = "default_environment")]
    pub environment: String,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How to reach the table hardware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Serial(SerialConfig),
    Mqtt(MqttConfig),
    Hid(HidConfig),
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Serial(_) => "serial",
            TransportConfig::Mqtt(_) => "mqtt",
            TransportConfig::Hid(_) => "hid",
        }
    }
}

/// Studio connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    /// `ws://` or `wss://` URL of the Studio table endpoint.
    pub server_url: String,
    /// Bearer token sent in the `Authorization` header.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// No inbound traffic for this long tears the session down.
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Notifications kept while the Studio is unreachable.  The oldest is
    /// dropped beyond this.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

impl RemoteConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Every budget and timing constant.  None of them are protocol contracts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    /// Reopen attempts before a controller read loop gives up.  0 = forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_transport_failure_budget")]
    pub transport_failure_budget: u32,
    #[serde(default = "default_transport_grace_ms")]
    pub transport_grace_ms: u64,
    #[serde(default = "default_malformed_budget")]
    pub malformed_budget: u32,
    #[serde(default = "default_result_confirm_ms")]
    pub result_confirm_ms: u64,
    #[serde(default = "default_max_error_secs")]
    pub max_error_secs: u64,
    #[serde(default = "default_controller_restart_budget")]
    pub controller_restart_budget: u32,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    #[serde(default = "default_frame_stale_ms")]
    pub frame_stale_ms: u64,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    #[serde(default = "default_scan_debounce_ms")]
    pub scan_debounce_ms: u64,
    #[serde(default = "default_alert_min_severity")]
    pub alert_min_severity: Severity,
}

impl PolicyConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_ms: self.backoff_base_ms,
            cap_ms: self.backoff_cap_ms,
            jitter: self.backoff_jitter,
        }
    }

    pub fn game_policy(&self) -> GamePolicy {
        GamePolicy {
            transport_failure_budget: self.transport_failure_budget,
            transport_grace_ms: self.transport_grace_ms,
            malformed_budget: self.malformed_budget,
            result_confirm_ms: self.result_confirm_ms,
            max_error_secs: self.max_error_secs,
        }
    }

    pub fn frame_stale(&self) -> Duration {
        Duration::from_millis(self.frame_stale_ms)
    }

    pub fn scan_debounce(&self) -> Duration {
        Duration::from_millis(self.scan_debounce_ms)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_name() -> String {
    "table-controller".to_string()
}
fn default_environment() -> String {
    "production".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_ping_interval_secs() -> u64 {
    10
}
fn default_ping_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_outbox_capacity() -> usize {
    1024
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_backoff_cap_ms() -> u64 {
    30_000
}
fn default_backoff_jitter() -> f64 {
    0.2
}
fn default_transport_failure_budget() -> u32 {
    5
}
fn default_transport_grace_ms() -> u64 {
    15_000
}
fn default_malformed_budget() -> u32 {
    3
}
fn default_result_confirm_ms() -> u64 {
    500
}
fn default_max_error_secs() -> u64 {
    300
}
fn default_controller_restart_budget() -> u32 {
    3
}
fn default_event_queue_capacity() -> usize {
    256
}
fn default_frame_stale_ms() -> u64 {
    2_000
}
fn default_max_frame_len() -> usize {
    512
}
fn default_scan_debounce_ms() -> u64 {
    300
}
fn default_alert_min_severity() -> Severity {
    Severity::Error
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            backoff_jitter: default_backoff_jitter(),
            max_reconnect_attempts: 0,
            transport_failure_budget: default_transport_failure_budget(),
            transport_grace_ms: default_transport_grace_ms(),
            malformed_budget: default_malformed_budget(),
            result_confirm_ms: default_result_confirm_ms(),
            max_error_secs: default_max_error_secs(),
            controller_restart_budget: default_controller_restart_budget(),
            event_queue_capacity: default_event_queue_capacity(),
            frame_stale_ms: default_frame_stale_ms(),
            max_frame_len: default_max_frame_len(),
            scan_debounce_ms: default_scan_debounce_ms(),
            alert_min_severity: default_alert_min_severity(),
        }
    }
}

impl AppConfig {
    pub fn session(&self) -> TableSession {
        TableSession::new(
            self.table.table_id.clone(),
            self.table.game_type,
            self.table.device_name.clone(),
        )
    }

    /// Rejects values that would make a component misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.table.table_id.trim().is_empty() {
            return invalid("table.table_id must not be empty".into());
        }
        if !(self.remote.server_url.starts_with("ws://")
            || self.remote.server_url.starts_with("wss://"))
        {
            return invalid(format!(
                "remote.server_url must be a ws:// or wss:// URL, got {:?}",
                self.remote.server_url
            ));
        }
        if self.remote.outbox_capacity == 0 {
            return invalid("remote.outbox_capacity must be at least 1".into());
        }
        if self.remote.ping_interval_secs == 0
            || self.remote.ping_timeout_secs < self.remote.ping_interval_secs
        {
            return invalid("remote.ping_timeout_secs must be >= ping_interval_secs > 0".into());
        }

        let p = &self.policy;
        if p.event_queue_capacity == 0 {
            return invalid("policy.event_queue_capacity must be at least 1".into());
        }
        if p.max_frame_len == 0 {
            return invalid("policy.max_frame_len must be at least 1".into());
        }
        if !(0.0..1.0).contains(&p.backoff_jitter) {
            return invalid(format!(
                "policy.backoff_jitter must be in [0, 1), got {}",
                p.backoff_jitter
            ));
        }
        if p.backoff_base_ms == 0 || p.backoff_cap_ms < p.backoff_base_ms {
            return invalid("policy.backoff_cap_ms must be >= backoff_base_ms > 0".into());
        }
        if p.transport_failure_budget == 0 || p.malformed_budget == 0 {
            return invalid("policy budgets must be at least 1".into());
        }

        match &self.transport {
            TransportConfig::Serial(s) if s.port.is_empty() => {
                invalid("transport.port must not be empty".into())
            }
            TransportConfig::Mqtt(m) if m.topic.is_empty() || m.command_topic.is_empty() => {
                invalid("transport.topic and transport.command_topic are required".into())
            }
            TransportConfig::Hid(h) if h.device_path.is_empty() => {
                invalid("transport.device_path must not be empty".into())
            }
            _ => Ok(()),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses and validates configuration text.
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed TOML or missing required keys,
/// [`ConfigError::Invalid`] for out-of-range values.
pub fn parse_config(text: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Loads the configuration file at `path`.
///
/// Unlike a desktop application, a table controller cannot fall back to
/// defaults when the file is missing: it would not know which table it is.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, otherwise as
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
