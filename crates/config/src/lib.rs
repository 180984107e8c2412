//! Configuration schema and endpoint discovery for ringkv processes.
//!
//! Both server configs carry the fixed protocol defaults (heartbeat port
//! and cadences, cache capacity, worker pool size) as overridable fields,
//! loadable from YAML. The coordinator publishes its endpoint through a
//! well-known two-line file read by nodes and clients at startup.

use ringkv_common::NodeIdentity;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the shared endpoint file in the working directory.
pub const ENDPOINT_FILE: &str = "cs_config.txt";

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Coordinator process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Listen host for the client/registration stream endpoint.
    pub host: String,

    /// Listen port for the client/registration stream endpoint.
    pub port: u16,

    /// Datagram port the heartbeat monitor listens on.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// Capacity of the result cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Maximum concurrently served sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Seconds between failure-detection sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Deadline for a single node RPC, in milliseconds.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,

    /// Where to publish the coordinator endpoint.
    #[serde(default = "default_endpoint_file")]
    pub endpoint_file: PathBuf,
}

impl CoordinatorConfig {
    /// Config for the given listen endpoint with all defaults.
    pub fn for_listen(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            udp_port: default_udp_port(),
            cache_capacity: default_cache_capacity(),
            max_sessions: default_max_sessions(),
            sweep_interval_secs: default_sweep_interval_secs(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            metrics_port: None,
            endpoint_file: default_endpoint_file(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be > 0".into()));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid("max_sessions must be > 0".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be > 0".into(),
            ));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid("rpc_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_from_str(&std::fs::read_to_string(path)?)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Data-node process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Listen host for coordinator-issued data operations.
    pub host: String,

    /// Listen port for coordinator-issued data operations.
    pub port: u16,

    /// Datagram port of the coordinator's heartbeat monitor.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// Seconds between heartbeat beacons.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Where to find the coordinator endpoint.
    #[serde(default = "default_endpoint_file")]
    pub endpoint_file: PathBuf,
}

impl NodeConfig {
    /// Config for the given listen endpoint with all defaults.
    pub fn for_listen(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            udp_port: default_udp_port(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            endpoint_file: default_endpoint_file(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_from_str(&std::fs::read_to_string(path)?)
    }
}

// --- Defaults ---

fn default_udp_port() -> u16 {
    3769
}
fn default_cache_capacity() -> usize {
    4
}
fn default_max_sessions() -> usize {
    10
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_heartbeat_interval_secs() -> u64 {
    5
}
fn default_rpc_timeout_ms() -> u64 {
    5000
}
fn default_endpoint_file() -> PathBuf {
    PathBuf::from(ENDPOINT_FILE)
}

// ---------------------------------------------------------------------------
// Endpoint file
// ---------------------------------------------------------------------------

/// Publish the coordinator endpoint: two lines, host then port.
pub fn write_endpoint(path: &Path, identity: &NodeIdentity) -> Result<(), ConfigError> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", identity.host())?;
    writeln!(file, "{}", identity.port())?;
    Ok(())
}

/// Read the coordinator endpoint published by [`write_endpoint`].
pub fn read_endpoint(path: &Path) -> Result<NodeIdentity, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents.lines();
    let host = lines
        .next()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| bad_endpoint(path, "missing host line"))?
        .trim();
    let port = lines
        .next()
        .ok_or_else(|| bad_endpoint(path, "missing port line"))?
        .trim()
        .parse::<u16>()
        .map_err(|_| bad_endpoint(path, "port is not a number"))?;
    Ok(NodeIdentity::new(host, port))
}

fn bad_endpoint(path: &Path, what: &str) -> ConfigError {
    ConfigError::BadEndpointFile(format!("{}: {}", path.display(), what))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("malformed endpoint file: {0}")]
    BadEndpointFile(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
