//! Discovery record types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Address;

/// Name of the contract whose deployment events are scanned.
pub const LBP_MANAGER_FACTORY: &str = "LBPManagerFactory";

/// Reference to a metadata document (typically an IPFS hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRef(pub String);

impl MetadataRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MetadataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to the factory contract that emits deployment events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryHandle {
    /// Contract name (e.g. `LBPManagerFactory`).
    pub name: String,
    /// Deployed factory address.
    pub address: Address,
}

impl FactoryHandle {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// One `LBPManagerDeployed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Address of the deployed LBP manager.
    pub lbp_manager: Address,
    /// Administrator of the LBP manager.
    pub admin: Address,
    /// Reference to the launch metadata document.
    pub metadata: MetadataRef,
}

impl DeploymentRecord {
    pub fn new(
        block_number: u64,
        lbp_manager: Address,
        admin: Address,
        metadata: MetadataRef,
    ) -> Self {
        Self {
            block_number,
            lbp_manager,
            admin,
            metadata,
        }
    }
}
