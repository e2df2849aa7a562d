//! Corruption eviction plumbing.
//!
//! Two kinds of notice reach one drain task: the per-entity `corrupt` watch
//! and corruption notices published on the bus. Both are applied the same
//! way, and entities never hold a reference back to the registry.
//!
//! Watch notices carry the scan generation that built the entity, so a
//! leftover entity from an abandoned scan cannot evict its replacement. Bus
//! notices name an address only and apply to whatever holds it.

use std::convert::Infallible;
use std::sync::Weak;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use primelaunch_protocols::Address;

use crate::supervisor::TaskSupervisor;

/// Request to drop an address from the visible map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EvictionNotice {
    pub(crate) address: Address,
    /// Scan that built the entity, `None` for notices from the bus.
    pub(crate) generation: Option<u64>,
}

/// Something that can drop an address from its visible set.
pub(crate) trait Evict: Send + Sync + 'static {
    fn evict(&self, notice: &EvictionNotice) -> bool;
}

/// Sending half of the eviction queue.
#[derive(Clone)]
pub(crate) struct EvictionQueue {
    sender: mpsc::UnboundedSender<EvictionNotice>,
}

impl EvictionQueue {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<EvictionNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Queue a notice. Returns `false` once the drain is gone.
    pub(crate) fn notify(&self, notice: EvictionNotice) -> bool {
        self.sender.send(notice).is_ok()
    }
}

/// Apply queued and bus notices to `target` until `closed` is cancelled or
/// `target` is gone.
pub(crate) fn spawn_drain<T: Evict>(
    supervisor: &TaskSupervisor,
    target: Weak<T>,
    mut queue: mpsc::UnboundedReceiver<EvictionNotice>,
    mut bus_notices: mpsc::UnboundedReceiver<Address>,
    closed: CancellationToken,
) {
    supervisor.spawn("lbp-eviction-drain", async move {
        loop {
            let notice = tokio::select! {
                _ = closed.cancelled() => break,
                Some(notice) = queue.recv() => notice,
                Some(address) = bus_notices.recv() => {
                    debug!(address = %address, "Corruption notice received");
                    EvictionNotice { address, generation: None }
                }
                else => break,
            };
            let Some(target) = target.upgrade() else {
                break;
            };
            target.evict(&notice);
        }
        Ok::<(), Infallible>(())
    });
}

/// Watch one entity's corrupt flag and queue its eviction on the first flip.
///
/// Ends when the flag flips or the entity is dropped.
pub(crate) fn watch_corruption(
    supervisor: &TaskSupervisor,
    address: Address,
    generation: u64,
    mut corrupt: watch::Receiver<bool>,
    queue: EvictionQueue,
) {
    supervisor.spawn(
        format!("corruption-watch:{}", address.short()),
        async move {
            if corrupt.wait_for(|corrupt| *corrupt).await.is_ok() {
                debug!(address = %address, generation, "LBP flagged corrupt");
                queue.notify(EvictionNotice {
                    address,
                    generation: Some(generation),
                });
            }
            Ok::<(), Infallible>(())
        },
    );
}
