//! Registry of discovered LBP managers.

mod entity_registry;
mod eviction;

pub use entity_registry::{EntityRegistry, RegistryConfig};
