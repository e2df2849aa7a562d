//! Discovery source protocol.
//!
//! A discovery source reports which LBP managers exist by replaying the
//! factory's deployment events. The blockchain transport behind it is not
//! part of this crate.

use async_trait::async_trait;

use crate::error::DiscoveryError;
use crate::types::{DeploymentRecord, FactoryHandle};

/// Source of deployment records.
///
/// Failures must be reported as [`DiscoveryError`]; an unreachable source
/// must never be reported as an empty result.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Acquire the handle of the factory contract whose events are scanned.
    async fn factory(&self) -> Result<FactoryHandle, DiscoveryError>;

    /// Query every deployment event emitted by `factory` from `from_block`
    /// up to the present, in emission order.
    async fn deployments(
        &self,
        factory: &FactoryHandle,
        from_block: u64,
    ) -> Result<Vec<DeploymentRecord>, DiscoveryError>;
}
