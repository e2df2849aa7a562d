//! Common types used across the registry.

mod address;
mod record;

pub use address::*;
pub use record::*;
