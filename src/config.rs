//! Configuration loading and types for the reconcile controller.
//!
//! Configuration is read from an optional YAML file, then selected fields
//! are overridden from the environment.  Each subsection governs a
//! different part of the system: node discovery, the heartbeat loop, the
//! JSON-RPC client, the health endpoint, and pod labelling.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::errors::ReconcileError;

/// Comma-separated static sequencer list.
pub const ENV_SEQUENCERS_LIST: &str = "SEQUENCERS_LIST";
/// StatefulSet name used for discovery.
pub const ENV_DISCOVERY_STS: &str = "DISCOVERY_STS";
/// Namespace of the StatefulSet.
pub const ENV_DISCOVERY_NS: &str = "DISCOVERY_NS";
/// Heartbeat interval (humantime syntax).
pub const ENV_CHECK_INTERVAL: &str = "CHECK_INTERVAL";
/// Maximum tolerated stall (humantime syntax).
pub const ENV_MAX_BLOCK_TIME: &str = "MAX_BLOCK_TIME";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Static, ordered list of sequencer RPC endpoints.  When non-empty it
    /// takes precedence over StatefulSet discovery.
    #[serde(default)]
    pub sequencers: Vec<String>,

    /// StatefulSet discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Failover loop timing.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// JSON-RPC client settings.
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Health endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Pod label mirroring.
    #[serde(default)]
    pub label: LabelConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Where to find the sequencer StatefulSet and how to address its pods.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// StatefulSet name.  Empty disables discovery.
    #[serde(default)]
    pub statefulset: String,

    /// Namespace of the StatefulSet.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// URL scheme of the node RPC endpoint.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Port of the node admin RPC endpoint.
    #[serde(default = "default_rpc_port")]
    pub port: u16,

    /// Cluster DNS suffix.
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            statefulset: String::new(),
            namespace: default_namespace(),
            scheme: default_scheme(),
            port: default_rpc_port(),
            cluster_domain: default_cluster_domain(),
        }
    }
}

/// Heartbeat loop timing.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval between two health checks of the primary.
    #[serde(default = "default_check_interval", with = "humantime_serde")]
    pub check_interval: Duration,

    /// How long the primary's unsafe head may stay flat before failover.
    #[serde(default = "default_max_block_time", with = "humantime_serde")]
    pub max_block_time: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            max_block_time: default_max_block_time(),
        }
    }
}

/// JSON-RPC client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Timeout of a single attempt, connection included.
    #[serde(default = "default_rpc_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Total attempts per call, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between two attempts.
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: default_rpc_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// HTTP health endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Whether to serve `/healthz`, `/readyz` and `/metrics`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long to wait for running tasks on shutdown.
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Pod label mirroring.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelConfig {
    /// Whether to run the label service (requires the `kubernetes` feature).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Label key set to `"true"` / `"false"` on every sequencer pod.
    #[serde(default = "default_active_key")]
    pub active_key: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            active_key: default_active_key(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_rpc_port() -> u16 {
    9545
}

fn default_cluster_domain() -> String {
    "cluster.local".to_string()
}

fn default_check_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_block_time() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_active_key() -> String {
    "sequencer.reconcile/active".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load configuration from the YAML file at `path`, then apply environment
/// overrides.  A missing file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        parse_config(&contents)?
    } else {
        Config::default()
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// Parse a YAML document into a [`Config`].  An empty document is valid.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

impl Config {
    /// Override fields from environment variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ReconcileError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(list) = lookup(ENV_SEQUENCERS_LIST) {
            self.sequencers = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(sts) = lookup(ENV_DISCOVERY_STS) {
            self.discovery.statefulset = sts;
        }
        if let Some(ns) = lookup(ENV_DISCOVERY_NS) {
            self.discovery.namespace = ns;
        }
        if let Some(raw) = lookup(ENV_CHECK_INTERVAL) {
            self.heartbeat.check_interval = parse_env_duration(ENV_CHECK_INTERVAL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_BLOCK_TIME) {
            self.heartbeat.max_block_time = parse_env_duration(ENV_MAX_BLOCK_TIME, &raw)?;
        }
        Ok(())
    }

    /// Reject configurations the controller cannot run with.
    ///
    /// The stall tolerance must be strictly longer than the check interval,
    /// otherwise every tick without a new block would force a failover.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.sequencers.is_empty() && self.discovery.statefulset.is_empty() {
            return Err(ReconcileError::Config(format!(
                "no sequencers specified: set `sequencers`, {ENV_SEQUENCERS_LIST} or {ENV_DISCOVERY_STS}"
            )));
        }
        if self.heartbeat.check_interval.is_zero() {
            return Err(ReconcileError::Config(
                "heartbeat.check_interval must be greater than zero".into(),
            ));
        }
        if self.heartbeat.max_block_time <= self.heartbeat.check_interval {
            return Err(ReconcileError::Config(format!(
                "heartbeat.max_block_time ({}) must exceed heartbeat.check_interval ({})",
                humantime::format_duration(self.heartbeat.max_block_time),
                humantime::format_duration(self.heartbeat.check_interval),
            )));
        }
        if self.rpc.timeout.is_zero() {
            return Err(ReconcileError::Config(
                "rpc.timeout must be greater than zero".into(),
            ));
        }
        if self.rpc.max_attempts == 0 {
            return Err(ReconcileError::Config(
                "rpc.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_env_duration(key: &str, raw: &str) -> Result<Duration, ReconcileError> {
    humantime::parse_duration(raw.trim()).map_err(|e| {
        ReconcileError::Config(format!("failed to parse {key} ({raw}): {e}"))
    })
}
