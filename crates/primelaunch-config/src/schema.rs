//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// First block worth scanning on mainnet (factory deployment).
pub const MAINNET_STARTING_BLOCK: u64 = 13_372_668;

/// First block worth scanning on the test networks.
pub const TESTNET_STARTING_BLOCK: u64 = 9_423_409;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Rinkeby,
    Kovan,
}

impl Network {
    /// Block the LBP manager factory was deployed at on this network.
    pub fn default_starting_block(self) -> u64 {
        match self {
            Network::Mainnet => MAINNET_STARTING_BLOCK,
            Network::Rinkeby | Network::Kovan => TESTNET_STARTING_BLOCK,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Rinkeby => write!(f, "rinkeby"),
            Network::Kovan => write!(f, "kovan"),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub name: Network,

    /// Overrides the network's factory deployment block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_block: Option<u64>,
}

impl NetworkConfig {
    /// Block the discovery scan starts from.
    pub fn starting_block(&self) -> u64 {
        self.starting_block
            .unwrap_or_else(|| self.name.default_starting_block())
    }
}

/// Discovery source configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Deployment fixture file (JSON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

/// Consumer loading-indicator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Waits shorter than this never show a loading indicator.
    #[serde(default = "default_loading_delay_ms")]
    pub loading_delay_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            loading_delay_ms: default_loading_delay_ms(),
        }
    }
}

impl LoaderConfig {
    pub fn loading_delay(&self) -> Duration {
        Duration::from_millis(self.loading_delay_ms)
    }
}

fn default_loading_delay_ms() -> u64 {
    200
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer per subscriber.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    256
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files. Console only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
