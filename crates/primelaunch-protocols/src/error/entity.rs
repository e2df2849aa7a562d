//! Entity-related errors.

use thiserror::Error;

use crate::types::Address;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Failed to create LBP from record {address}: {message}")]
    Construction { address: Address, message: String },

    #[error("LBP initialization failed for {address}: {message}")]
    InitializationFailed { address: Address, message: String },

    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("LBP is corrupt: {0}")]
    Corrupt(Address),

    #[error("{0}")]
    Custom(String),
}
