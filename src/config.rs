//! Configuration for the relay
//!
//! Loaded from a YAML file; every field has a sensible default so an empty
//! file (or none at all) runs against the public EDDN endpoint and a local
//! NATS server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};
use crate::feed::DEFAULT_ENDPOINT;

/// Schemas the relay guarantees to have compiled before accepting traffic.
/// Configuration, not derived data.
pub const DEFAULT_PRELOAD: [&str; 17] = [
    "https://eddn.edcd.io/schemas/journal/1",
    "https://eddn.edcd.io/schemas/fsssignaldiscovered/1",
    "https://eddn.edcd.io/schemas/fssdiscoveryscan/1",
    "https://eddn.edcd.io/schemas/navroute/1",
    "https://eddn.edcd.io/schemas/scanbarycentre/1",
    "https://eddn.edcd.io/schemas/fssallbodiesfound/1",
    "https://eddn.edcd.io/schemas/dockinggranted/1",
    "https://eddn.edcd.io/schemas/commodity/3",
    "https://eddn.edcd.io/schemas/fssbodysignals/1",
    "https://eddn.edcd.io/schemas/outfitting/2",
    "https://eddn.edcd.io/schemas/shipyard/2",
    "https://eddn.edcd.io/schemas/codexentry/1",
    "https://eddn.edcd.io/schemas/approachsettlement/1",
    "https://eddn.edcd.io/schemas/dockingdenied/1",
    "https://eddn.edcd.io/schemas/navbeaconscan/1",
    "https://eddn.edcd.io/schemas/fcmaterials_capi/1",
    "https://eddn.edcd.io/schemas/fcmaterials_journal/1",
];

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub schemas: SchemaConfig,
    #[serde(default)]
    pub settings: Settings,
}

/// Upstream feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

/// Outbound bus configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BusConfig {
    /// NATS server URIs
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
    /// Client connection name
    #[serde(default = "default_client_name")]
    pub name: String,
}

/// Schema resolution configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// Schema references compiled eagerly at startup
    #[serde(default = "default_preload")]
    pub preload: Vec<String>,
    /// Disable TLS verification for schema fetches (development only)
    #[serde(default)]
    pub insecure_tls: bool,
    /// Optional audit file recording every schema URL the relay compiled
    #[serde(default)]
    pub audit_file: Option<PathBuf>,
}

/// Runtime tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Bounded frame queue capacity; small on purpose, for backpressure
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Frames slower than this log a slow-message warning
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,
    /// Interval between throughput log lines
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Prometheus endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_servers() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

fn default_client_name() -> String {
    "eddn-relay".to_string()
}

fn default_preload() -> Vec<String> {
    DEFAULT_PRELOAD.iter().map(|s| s.to_string()).collect()
}

fn default_channel_capacity() -> usize {
    5
}

fn default_slow_threshold_ms() -> u64 {
    1000
}

fn default_stats_interval_secs() -> u64 {
    60
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            name: default_client_name(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            preload: default_preload(),
            insecure_tls: false,
            audit_file: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            slow_threshold_ms: default_slow_threshold_ms(),
            stats_interval_secs: default_stats_interval_secs(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("could not read {}: {e}", path.display()))
        })?;
        let config: RelayConfig = serde_yaml::from_str(&contents).map_err(|e| {
            RelayError::config(format!("could not parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        if self.feed.endpoint.is_empty() {
            return Err(RelayError::config("feed.endpoint must not be empty"));
        }
        if self.bus.servers.is_empty() {
            return Err(RelayError::config("bus.servers must not be empty"));
        }
        if self.schemas.preload.is_empty() {
            return Err(RelayError::config("schemas.preload must not be empty"));
        }
        if self.settings.channel_capacity == 0 {
            return Err(RelayError::config(
                "settings.channel_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}
