//! # Prime Launch Core
//!
//! Lazily populated registry of deployed LBP managers.
//!
//! ## Components
//!
//! - [`EntityRegistry`] - Single-flight discovery scan, corruption eviction
//! - [`EntityLoader`] - Resolves one entity with a flicker-free loading signal
//! - [`EventBus`] - Process-wide exception, loading and corruption events
//! - [`TaskSupervisor`] - Tracks background work and reports its failures
//! - [`EntityState`] - Initialization and corruption cell for entities
//! - [`LbpManager`] - The LBP manager entity and its factory

pub mod events;
pub mod lbp;
pub mod loader;
pub mod registry;
pub mod state;
pub mod supervisor;

pub use events::{AppEvent, EventBus, ExceptionEvent};
pub use lbp::{LbpManager, LbpManagerFactory, LbpMetadata, MetadataResolver};
pub use loader::{EntityLoader, LoadingIndicator};
pub use registry::{EntityRegistry, RegistryConfig};
pub use state::{EntityState, InitGuard, InitPhase};
pub use supervisor::{SupervisorMetrics, TaskSupervisor};

#[cfg(test)]
pub(crate) mod test_support;
