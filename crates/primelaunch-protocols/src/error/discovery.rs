//! Discovery-related errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery source unreachable: {0}")]
    Unreachable(String),

    #[error("Factory contract not available: {0}")]
    FactoryUnavailable(String),

    #[error("Event query failed: {0}")]
    Query(String),

    #[error("Malformed deployment record: {0}")]
    MalformedRecord(String),

    #[error("Request timeout")]
    Timeout,
}
