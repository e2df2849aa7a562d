//! Error types for the registry protocol layer.

mod discovery;
mod entity;
mod registry;

pub use discovery::*;
pub use entity::*;
pub use registry::*;
