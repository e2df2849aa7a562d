//! Process-wide event bus.
//!
//! Carries the three broadcast channels the registry and its consumers share:
//! - exceptions, for user-facing error notifications
//! - the loading indicator, shown and retracted by consumers
//! - corruption notices, an explicit path to evicting an LBP
//!
//! Broadcast subscribers that fall behind lose the oldest events. Eviction
//! must not, so corruption notices are also delivered to every
//! [`EventBus::subscribe_corruption`] receiver over an unbounded queue.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use primelaunch_protocols::Address;

/// Topic names, one per event kind.
pub mod topics {
    pub const EXCEPTION: &str = "handleException";
    pub const LOADING: &str = "lbp.loading";
    pub const ENTITY_CORRUPT: &str = "lbp.initialization_failed";
}

/// Default per-subscriber buffer.
pub const DEFAULT_CAPACITY: usize = 256;

/// A reported failure: a one-line message plus its cause.
#[derive(Clone)]
pub struct ExceptionEvent {
    pub message: String,
    pub cause: Arc<dyn Error + Send + Sync>,
    pub at: DateTime<Utc>,
}

impl fmt::Debug for ExceptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionEvent")
            .field("message", &self.message)
            .field("cause", &self.cause.to_string())
            .field("at", &self.at)
            .finish()
    }
}

impl fmt::Display for ExceptionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.message, self.cause)
    }
}

/// Event published on the bus.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Something failed and the user should be told.
    Exception(ExceptionEvent),
    /// Show (`true`) or retract (`false`) the loading indicator.
    Loading(bool),
    /// The LBP at this address is no longer valid.
    EntityCorrupt(Address),
}

impl AppEvent {
    /// Topic this event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            AppEvent::Exception(_) => topics::EXCEPTION,
            AppEvent::Loading(_) => topics::LOADING,
            AppEvent::EntityCorrupt(_) => topics::ENTITY_CORRUPT,
        }
    }
}

/// Broadcast bus shared by the registry, entities and consumers.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
    corruption_sinks: Arc<Mutex<Vec<mpsc::UnboundedSender<Address>>>>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber buffer.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            corruption_sinks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Receive every corruption notice published from now on, without loss.
    ///
    /// The sink is dropped on the first publish after the receiver is gone.
    pub fn subscribe_corruption(&self) -> mpsc::UnboundedReceiver<Address> {
        let (sink, receiver) = mpsc::unbounded_channel();
        self.corruption_sinks.lock().push(sink);
        receiver
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish an event, returning how many subscribers received it.
    pub fn publish(&self, event: AppEvent) -> usize {
        debug!(topic = event.topic(), "Publishing event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Report a failure to the exception channel.
    pub fn publish_exception<E>(&self, message: impl Into<String>, cause: E) -> usize
    where
        E: Error + Send + Sync + 'static,
    {
        self.publish(AppEvent::Exception(ExceptionEvent {
            message: message.into(),
            cause: Arc::new(cause),
            at: Utc::now(),
        }))
    }

    /// Show or retract the loading indicator.
    pub fn publish_loading(&self, loading: bool) -> usize {
        self.publish(AppEvent::Loading(loading))
    }

    /// Announce that an LBP is no longer valid.
    ///
    /// Returns the number of broadcast subscribers; corruption receivers
    /// are not counted.
    pub fn publish_corrupt(&self, address: Address) -> usize {
        self.corruption_sinks
            .lock()
            .retain(|sink| sink.send(address.clone()).is_ok());
        self.publish(AppEvent::EntityCorrupt(address))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
