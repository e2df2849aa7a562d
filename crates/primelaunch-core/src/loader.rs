//! Consumer-side resolution of a single LBP.
//!
//! A consumer asks for one address and waits for the registry scan and for
//! that entity's own setup. The loading indicator only appears if the wait
//! outlasts a short grace period, so fast loads never flash it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use primelaunch_protocols::{Address, Entity, LoadError};

use crate::events::EventBus;
use crate::registry::EntityRegistry;

/// Grace period before the loading indicator is shown.
pub const DEFAULT_LOADING_DELAY: Duration = Duration::from_millis(200);

/// Guard for a shown loading indicator. Retracts it on drop.
pub struct LoadingIndicator {
    bus: EventBus,
}

impl LoadingIndicator {
    /// Publish `loading = true` and return the guard that will retract it.
    pub fn show(bus: &EventBus) -> Self {
        bus.publish_loading(true);
        Self { bus: bus.clone() }
    }
}

impl Drop for LoadingIndicator {
    fn drop(&mut self) {
        self.bus.publish_loading(false);
    }
}

/// Resolves single entities for consumers.
pub struct EntityLoader<E: Entity> {
    registry: EntityRegistry<E>,
    bus: EventBus,
    loading_delay: Duration,
}

impl<E: Entity> Clone for EntityLoader<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            bus: self.bus.clone(),
            loading_delay: self.loading_delay,
        }
    }
}

impl<E: Entity> EntityLoader<E> {
    pub fn new(registry: EntityRegistry<E>, bus: EventBus, loading_delay: Duration) -> Self {
        Self {
            registry,
            bus,
            loading_delay,
        }
    }

    pub fn registry(&self) -> &EntityRegistry<E> {
        &self.registry
    }

    pub fn loading_delay(&self) -> Duration {
        self.loading_delay
    }

    /// Resolve `address` once the registry and the entity are both ready.
    ///
    /// Publishes `loading = true` if this takes longer than the loading
    /// delay, and always balances it with `loading = false`. Failures other
    /// than an unknown address are also reported as exceptions.
    pub async fn load(&self, address: &Address) -> Result<Arc<E>, LoadError> {
        let wait = self.wait_for(address);
        tokio::pin!(wait);

        let mut indicator = None;
        let outcome = tokio::select! {
            biased;
            outcome = &mut wait => outcome,
            _ = tokio::time::sleep(self.loading_delay) => {
                indicator = Some(LoadingIndicator::show(&self.bus));
                wait.await
            }
        };

        match &outcome {
            Ok(_) => debug!(address = %address, "LBP ready"),
            Err(LoadError::NotFound(_)) => warn!(address = %address, "LBP not found"),
            Err(err) => {
                warn!(address = %address, error = %err, "Failed to load LBP");
                self.bus
                    .publish_exception("Sorry, an error occurred", err.clone());
            }
        }

        drop(indicator);
        outcome
    }

    async fn wait_for(&self, address: &Address) -> Result<Arc<E>, LoadError> {
        if self.registry.is_initializing() {
            self.registry.ensure_initialized().await?;
        }

        let entity = self
            .registry
            .get(address)
            .ok_or_else(|| LoadError::NotFound(address.clone()))?;

        if entity.is_initializing() {
            entity.ensure_initialized().await?;
        }
        Ok(entity)
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
