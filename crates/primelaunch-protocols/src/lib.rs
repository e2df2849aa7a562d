//! # Prime Launch Protocols
//!
//! Protocol definitions (traits) for the Prime Launch LBP registry.
//! Contains only interface definitions - no implementations.
//!
//! ## Core Traits
//!
//! - [`DiscoverySource`] - Reports which LBP managers have been deployed
//! - [`Entity`] - A discovered item that initializes itself in the background
//! - [`EntityFactory`] - Builds an [`Entity`] from one deployment record

pub mod discovery;
pub mod entity;
pub mod error;
pub mod types;

pub use discovery::DiscoverySource;
pub use entity::{Entity, EntityFactory};
pub use error::{DiscoveryError, EntityError, LoadError, RegistryError};
pub use types::*;
