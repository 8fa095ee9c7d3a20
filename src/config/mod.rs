pub mod env;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::bus::BusRole;

/// Broker connection settings for one bus
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    /// Topic namespace on this bus (e.g. "tools", "nemo/esp32")
    pub namespace: String,
    /// Fixed MQTT client id. Generated per process when absent.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    /// PEM CA bundle; platform roots are used when absent
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Request queue capacity between client handle and event loop
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    64
}

impl BusConfig {
    /// Backend-facing broker defaults
    pub fn backend() -> Self {
        Self::local(1886, "tools")
    }

    /// Device-facing broker defaults
    pub fn device() -> Self {
        Self::local(1883, "devices")
    }

    fn local(port: u16, namespace: &str) -> Self {
        Self {
            host: "localhost".to_string(),
            port,
            namespace: namespace.to_string(),
            client_id: None,
            username: None,
            password: None,
            tls: false,
            ca_file: None,
            keep_alive_secs: default_keep_alive_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }

    /// `host:port`, used for probing and logging
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured client id, or a fresh `tool-relay-<role>-<uuid>` one
    pub fn client_id_for(&self, role: BusRole) -> String {
        match &self.client_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                format!("tool-relay-{}-{}", role, &suffix[..8])
            }
        }
    }
}

/// Display policy for device payloads
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// Fixed offset applied to backend UTC instants
    #[serde(default)]
    pub timezone_offset_hours: i32,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_user_label")]
    pub user_label: String,
    #[serde(default = "default_enabled_user_label")]
    pub enabled_user_label: String,
    #[serde(default = "default_last_user_label")]
    pub last_user_label: String,
    /// Serialized payloads above this size are logged
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

fn default_max_name_length() -> usize {
    14
}

fn default_user_label() -> String {
    "User".to_string()
}

fn default_enabled_user_label() -> String {
    "Current User".to_string()
}

fn default_last_user_label() -> String {
    "Last User".to_string()
}

fn default_max_payload_bytes() -> usize {
    200
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone_offset_hours: 0,
            max_name_length: default_max_name_length(),
            user_label: default_user_label(),
            enabled_user_label: default_enabled_user_label(),
            last_user_label: default_last_user_label(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

/// Connection supervisor timing
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
    /// Pause before re-polling a dropped connection
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Wait after a broker restart before re-probing
    #[serde(default = "default_restart_grace")]
    pub restart_grace_ms: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Program + args that restart the device broker. Empty disables restarts.
    #[serde(default)]
    pub restart_command: Vec<String>,
}

fn default_health_interval() -> u64 {
    5
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_restart_grace() -> u64 {
    10_000
}

fn default_probe_timeout() -> u64 {
    1000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_interval_secs: default_health_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
            restart_grace_ms: default_restart_grace(),
            probe_timeout_ms: default_probe_timeout(),
            restart_command: Vec::new(),
        }
    }
}

/// Complete relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Retained "online"/"offline" topic on the device bus
    #[serde(default = "default_liveness_topic")]
    pub liveness_topic: String,
    /// Legacy id -> name mapping file (TOML `[tools]` table)
    #[serde(default)]
    pub mapping_file: Option<PathBuf>,
    #[serde(default = "BusConfig::backend")]
    pub backend: BusConfig,
    #[serde(default = "BusConfig::device")]
    pub device: BusConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

fn default_liveness_topic() -> String {
    "tool-relay/status".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            liveness_topic: default_liveness_topic(),
            mapping_file: None,
            backend: BusConfig::backend(),
            device: BusConfig::device(),
            display: DisplayConfig::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

/// Startup configuration faults. Any of these aborts the process.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingHost(BusRole),
    InvalidPort(BusRole),
    EmptyNamespace(BusRole),
    TimezoneOutOfRange(i32),
    NameLengthOutOfRange(usize),
    ZeroInterval(&'static str),
    EmptyLivenessTopic,
    RelayLoop,
    InvalidOverride { var: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingHost(role) => write!(f, "{} broker host is required", role),
            ConfigError::InvalidPort(role) => write!(f, "{} broker port must be non-zero", role),
            ConfigError::EmptyNamespace(role) => {
                write!(f, "{} topic namespace must not be empty", role)
            }
            ConfigError::TimezoneOutOfRange(h) => {
                write!(f, "timezone offset must be within -12..=14 hours, got {}", h)
            }
            ConfigError::NameLengthOutOfRange(n) => {
                write!(f, "max name length must be within 1..={}, got {}", MAX_NAME_LENGTH, n)
            }
            ConfigError::ZeroInterval(name) => write!(f, "{} must be greater than zero", name),
            ConfigError::EmptyLivenessTopic => write!(f, "liveness topic must not be empty"),
            ConfigError::RelayLoop => write!(
                f,
                "backend and device buses share endpoint and namespace; relay would loop"
            ),
            ConfigError::InvalidOverride { var, value } => {
                write!(f, "invalid value '{}' for {}", value, var)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Upper bound for `display.max_name_length`
pub const MAX_NAME_LENGTH: usize = 64;

impl RelayConfig {
    /// Checks ranges and required fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (role, bus) in [(BusRole::Backend, &self.backend), (BusRole::Device, &self.device)] {
            if bus.host.trim().is_empty() {
                return Err(ConfigError::MissingHost(role));
            }
            if bus.port == 0 {
                return Err(ConfigError::InvalidPort(role));
            }
            if bus.namespace.trim_matches('/').is_empty() {
                return Err(ConfigError::EmptyNamespace(role));
            }
            if bus.keep_alive_secs == 0 {
                return Err(ConfigError::ZeroInterval("keep_alive_secs"));
            }
            if bus.queue_capacity == 0 {
                return Err(ConfigError::ZeroInterval("queue_capacity"));
            }
        }

        if self.backend.endpoint() == self.device.endpoint()
            && self.backend.namespace.trim_matches('/') == self.device.namespace.trim_matches('/')
        {
            return Err(ConfigError::RelayLoop);
        }

        let tz = self.display.timezone_offset_hours;
        if !(-12..=14).contains(&tz) {
            return Err(ConfigError::TimezoneOutOfRange(tz));
        }

        let len = self.display.max_name_length;
        if len == 0 || len > MAX_NAME_LENGTH {
            return Err(ConfigError::NameLengthOutOfRange(len));
        }

        if self.supervisor.health_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("health_interval_secs"));
        }
        if self.supervisor.reconnect_delay_ms == 0 {
            return Err(ConfigError::ZeroInterval("reconnect_delay_ms"));
        }
        if self.supervisor.probe_timeout_ms == 0 {
            return Err(ConfigError::ZeroInterval("probe_timeout_ms"));
        }

        if self.liveness_topic.trim().is_empty() {
            return Err(ConfigError::EmptyLivenessTopic);
        }

        Ok(())
    }

    /// Loads file (if any), applies env overrides, validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_config(path)?,
            None => RelayConfig::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config: RelayConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    Ok(config)
}
