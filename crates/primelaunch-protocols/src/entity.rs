//! Entity protocol definitions.
//!
//! The registry only relies on the narrow surface below: construction from a
//! record, a background `initialize`, an awaitable `ensure_initialized`, and
//! the observable `corrupt` flag. How an entity initializes is its own
//! business.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::EntityError;
use crate::types::{Address, DeploymentRecord};

/// A discovered item held by the registry.
#[async_trait]
pub trait Entity: Send + Sync + 'static {
    /// Identity of the entity. Never changes after construction.
    fn address(&self) -> &Address;

    /// Run the entity's own setup.
    ///
    /// The registry spawns this in the background and never awaits it.
    /// Failures that make the entity unusable must also flip `corrupt`.
    async fn initialize(&self) -> Result<(), EntityError>;

    /// Wait until the entity's setup has concluded.
    async fn ensure_initialized(&self) -> Result<(), EntityError>;

    /// Whether setup is still in progress.
    fn is_initializing(&self) -> bool;

    /// Observe the corrupt flag. Starts `false`.
    fn corrupt(&self) -> watch::Receiver<bool>;

    /// Current value of the corrupt flag.
    fn is_corrupt(&self) -> bool {
        *self.corrupt().borrow()
    }
}

/// Builds entities from deployment records.
pub trait EntityFactory: Send + Sync {
    type Entity: Entity;

    /// Create an entity from one record. Must not start initialization.
    fn create(&self, record: &DeploymentRecord) -> Result<Arc<Self::Entity>, EntityError>;
}
