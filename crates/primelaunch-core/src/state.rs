//! Initialization and corruption state for entities.

use tokio::sync::watch;
use tracing::warn;

/// Where an entity is in its own setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    Initializing,
    Ready,
    Failed,
}

/// Shared state cell an [`Entity`](primelaunch_protocols::Entity) embeds.
///
/// Starts out initializing and not corrupt. Both flags are `watch` channels
/// so the registry and consumers can wait on them without polling.
#[derive(Debug)]
pub struct EntityState {
    phase: watch::Sender<InitPhase>,
    corrupt: watch::Sender<bool>,
}

impl EntityState {
    pub fn new() -> Self {
        let (phase, _) = watch::channel(InitPhase::Initializing);
        let (corrupt, _) = watch::channel(false);
        Self { phase, corrupt }
    }

    pub fn phase(&self) -> InitPhase {
        *self.phase.borrow()
    }

    pub fn is_initializing(&self) -> bool {
        self.phase() == InitPhase::Initializing
    }

    pub fn mark_ready(&self) {
        self.phase.send_replace(InitPhase::Ready);
    }

    pub fn mark_failed(&self) {
        self.phase.send_replace(InitPhase::Failed);
    }

    /// Flip the corrupt flag. Returns `true` only for the first flip.
    pub fn mark_corrupt(&self) -> bool {
        self.corrupt.send_if_modified(|corrupt| {
            if *corrupt {
                false
            } else {
                *corrupt = true;
                true
            }
        })
    }

    pub fn is_corrupt(&self) -> bool {
        *self.corrupt.borrow()
    }

    /// Receiver for the corrupt flag.
    pub fn corrupt_receiver(&self) -> watch::Receiver<bool> {
        self.corrupt.subscribe()
    }

    /// Guard for one run of setup. See [`InitGuard`].
    pub fn init_guard(&self) -> InitGuard<'_> {
        InitGuard { state: self }
    }

    /// Wait until setup has concluded and return how it ended.
    pub async fn wait_initialized(&self) -> InitPhase {
        let mut phase = self.phase.subscribe();
        match phase
            .wait_for(|phase| *phase != InitPhase::Initializing)
            .await
        {
            Ok(phase) => *phase,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => InitPhase::Failed,
        }
    }
}

impl Default for EntityState {
    fn default() -> Self {
        Self::new()
    }
}

/// Concludes setup as failed and corrupt when dropped while the state is
/// still initializing, so a setup that panics or is cancelled part way never
/// leaves waiters hanging.
#[must_use = "setup is only concluded when the guard is dropped"]
pub struct InitGuard<'a> {
    state: &'a EntityState,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.state.is_initializing() {
            warn!("Setup ended without concluding, marking entity corrupt");
            self.state.mark_corrupt();
            self.state.mark_failed();
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
