//! The LBP manager entity.
//!
//! An [`LbpManager`] is built from one `LBPManagerDeployed` event. Its setup
//! fetches the launch metadata document the event points at; a manager whose
//! metadata cannot be fetched or is unusable is corrupt.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use primelaunch_protocols::{
    Address, DeploymentRecord, Entity, EntityError, EntityFactory, MetadataRef,
};

use crate::events::EventBus;
use crate::state::{EntityState, InitPhase};

/// Launch metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LbpMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl LbpMetadata {
    fn validate(&self) -> Result<(), EntityError> {
        if self.name.trim().is_empty() {
            return Err(EntityError::InvalidMetadata(
                "launch name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fetches metadata documents by reference.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, reference: &MetadataRef) -> Result<LbpMetadata, EntityError>;
}

/// One deployed LBP manager.
pub struct LbpManager {
    address: Address,
    admin: Address,
    metadata_ref: MetadataRef,
    block_number: u64,
    metadata: RwLock<Option<LbpMetadata>>,
    state: EntityState,
    resolver: Arc<dyn MetadataResolver>,
    bus: EventBus,
}

impl fmt::Debug for LbpManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LbpManager")
            .field("address", &self.address)
            .field("admin", &self.admin)
            .field("block_number", &self.block_number)
            .field("phase", &self.state.phase())
            .field("corrupt", &self.state.is_corrupt())
            .finish_non_exhaustive()
    }
}

impl LbpManager {
    pub fn new(record: &DeploymentRecord, resolver: Arc<dyn MetadataResolver>, bus: EventBus) -> Self {
        Self {
            address: record.lbp_manager.clone(),
            admin: record.admin.clone(),
            metadata_ref: record.metadata.clone(),
            block_number: record.block_number,
            metadata: RwLock::new(None),
            state: EntityState::new(),
            resolver,
            bus,
        }
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    pub fn metadata_ref(&self) -> &MetadataRef {
        &self.metadata_ref
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Metadata, once setup has fetched it.
    pub fn metadata(&self) -> Option<LbpMetadata> {
        self.metadata.read().clone()
    }

    /// Launch name, once known.
    pub fn name(&self) -> Option<String> {
        self.metadata.read().as_ref().map(|m| m.name.clone())
    }

    async fn load_metadata(&self) -> Result<LbpMetadata, EntityError> {
        if self.metadata_ref.is_empty() {
            return Err(EntityError::MetadataUnavailable(format!(
                "{} has no metadata reference",
                self.address
            )));
        }
        let metadata = self.resolver.resolve(&self.metadata_ref).await?;
        metadata.validate()?;
        Ok(metadata)
    }

    fn mark_corrupt(&self) {
        if self.state.mark_corrupt() {
            warn!(address = %self.address, "LBP is corrupt");
            self.bus.publish_corrupt(self.address.clone());
        }
    }
}

#[async_trait]
impl Entity for LbpManager {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn initialize(&self) -> Result<(), EntityError> {
        let _guard = self.state.init_guard();
        match self.load_metadata().await {
            Ok(metadata) => {
                debug!(address = %self.address, name = %metadata.name, "LBP initialized");
                *self.metadata.write() = Some(metadata);
                self.state.mark_ready();
                Ok(())
            }
            Err(err) => {
                self.mark_corrupt();
                self.state.mark_failed();
                Err(EntityError::InitializationFailed {
                    address: self.address.clone(),
                    message: err.to_string(),
                })
            }
        }
    }

    async fn ensure_initialized(&self) -> Result<(), EntityError> {
        match self.state.wait_initialized().await {
            InitPhase::Ready if !self.state.is_corrupt() => Ok(()),
            _ => Err(EntityError::Corrupt(self.address.clone())),
        }
    }

    fn is_initializing(&self) -> bool {
        self.state.is_initializing()
    }

    fn corrupt(&self) -> watch::Receiver<bool> {
        self.state.corrupt_receiver()
    }

    fn is_corrupt(&self) -> bool {
        self.state.is_corrupt()
    }
}

/// Builds [`LbpManager`]s from deployment records.
pub struct LbpManagerFactory {
    resolver: Arc<dyn MetadataResolver>,
    bus: EventBus,
}

impl LbpManagerFactory {
    pub fn new(resolver: Arc<dyn MetadataResolver>, bus: EventBus) -> Self {
        Self { resolver, bus }
    }
}

impl EntityFactory for LbpManagerFactory {
    type Entity = LbpManager;

    fn create(&self, record: &DeploymentRecord) -> Result<Arc<LbpManager>, EntityError> {
        if record.lbp_manager.is_zero() {
            return Err(EntityError::Construction {
                address: record.lbp_manager.clone(),
                message: "LBP manager address is zero".to_string(),
            });
        }

        Ok(Arc::new(LbpManager::new(
            record,
            Arc::clone(&self.resolver),
            self.bus.clone(),
        )))
    }
}

#[cfg(test)]
#[path = "lbp_tests.rs"]
mod tests;
