//! Registry and loader errors.

use std::sync::Arc;

use thiserror::Error;

use super::{DiscoveryError, EntityError};
use crate::types::Address;

/// Outcome of a failed population attempt.
///
/// Cloneable so that every caller awaiting the shared population observes
/// the same failure.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("LBP registry population failed: {0}")]
    Discovery(Arc<DiscoveryError>),

    #[error("LBP registry population aborted: {0}")]
    Aborted(String),
}

impl From<DiscoveryError> for RegistryError {
    fn from(err: DiscoveryError) -> Self {
        Self::Discovery(Arc::new(err))
    }
}

/// Errors seen by a consumer resolving one entity.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("LBP not found: {0}")]
    NotFound(Address),

    #[error(transparent)]
    Entity(Arc<EntityError>),
}

impl From<EntityError> for LoadError {
    fn from(err: EntityError) -> Self {
        Self::Entity(Arc::new(err))
    }
}

impl LoadError {
    /// Whether the identity was simply absent from the registry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
