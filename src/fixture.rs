//! JSON fixture that stands in for the chain and the metadata store.
//!
//! ```json
//! {
//!   "factory": "0x…",
//!   "latency_ms": 0,
//!   "deployments": [
//!     { "block_number": 9423500, "lbp_manager": "0x…", "admin": "0x…", "metadata": "Qm…" }
//!   ],
//!   "metadata": { "Qm…": { "name": "Prime Token LBP" } }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use primelaunch_core::{LbpMetadata, MetadataResolver};
use primelaunch_protocols::{
    Address, DeploymentRecord, DiscoveryError, DiscoverySource, EntityError, FactoryHandle,
    LBP_MANAGER_FACTORY, MetadataRef,
};

#[derive(Debug, Error)]
pub(crate) enum FixtureError {
    #[error("Failed to read fixture {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid fixture {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    factory: Option<Address>,
    #[serde(default)]
    latency_ms: u64,
    #[serde(default)]
    deployments: Vec<DeploymentRecord>,
    #[serde(default)]
    metadata: HashMap<MetadataRef, LbpMetadata>,
}

/// Discovery source and metadata resolver read from one JSON file.
#[derive(Debug)]
pub(crate) struct FixtureSource {
    factory: Option<Address>,
    latency: Duration,
    deployments: Vec<DeploymentRecord>,
    metadata: HashMap<MetadataRef, LbpMetadata>,
}

impl FixtureSource {
    pub(crate) fn load(path: &Path) -> Result<Self, FixtureError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| FixtureError::Parse {
            path: display,
            source,
        })
    }

    pub(crate) fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let file: FixtureFile = serde_json::from_str(content)?;

        let mut deployments = file.deployments;
        deployments.sort_by_key(|record| record.block_number);

        Ok(Self {
            factory: file.factory,
            latency: Duration::from_millis(file.latency_ms),
            deployments,
            metadata: file.metadata,
        })
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl DiscoverySource for FixtureSource {
    async fn factory(&self) -> Result<FactoryHandle, DiscoveryError> {
        let address = self
            .factory
            .clone()
            .ok_or_else(|| DiscoveryError::FactoryUnavailable(LBP_MANAGER_FACTORY.to_string()))?;
        Ok(FactoryHandle::new(LBP_MANAGER_FACTORY, address))
    }

    async fn deployments(
        &self,
        factory: &FactoryHandle,
        from_block: u64,
    ) -> Result<Vec<DeploymentRecord>, DiscoveryError> {
        self.simulate_latency().await;

        let records: Vec<_> = self
            .deployments
            .iter()
            .filter(|record| record.block_number >= from_block)
            .cloned()
            .collect();
        debug!(factory = %factory.address, from_block, count = records.len(), "Fixture deployments");
        Ok(records)
    }
}

#[async_trait]
impl MetadataResolver for FixtureSource {
    async fn resolve(&self, reference: &MetadataRef) -> Result<LbpMetadata, EntityError> {
        self.simulate_latency().await;
        self.metadata
            .get(reference)
            .cloned()
            .ok_or_else(|| EntityError::MetadataUnavailable(reference.to_string()))
    }
}

#[cfg(test)]
#[path = "fixture_tests.rs"]
mod tests;
