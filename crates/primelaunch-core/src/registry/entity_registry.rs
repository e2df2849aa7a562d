//! Lazily populated registry of deployed LBP managers.
//!
//! The registry scans the factory's deployment events once, builds one
//! entity per record and publishes the whole map in a single step. Readers
//! either see "not populated yet" or the complete map, never a partial one.
//!
//! ## Population
//!
//! Every caller of [`EntityRegistry::ensure_initialized`] awaits the same
//! memoized operation, so concurrent callers trigger exactly one discovery
//! query. The scan itself runs on its own task and keeps going even if
//! every waiter goes away.
//!
//! ## Eviction
//!
//! Each entity's `corrupt` flag is watched for as long as the entity is
//! resident. The first `true`, or an `EntityCorrupt` event on the bus,
//! removes it from the map. Nothing else ever shrinks the map, and removal
//! never triggers a rescan.
//!
//! Every scan has a generation number. A watch notice from an entity built
//! by an earlier scan is ignored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use primelaunch_protocols::{
    Address, DiscoveryError, DiscoverySource, Entity, EntityFactory, RegistryError,
};

use super::eviction::{self, Evict, EvictionNotice, EvictionQueue};
use crate::events::EventBus;
use crate::supervisor::TaskSupervisor;

/// Registry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// First block of the deployment event scan.
    pub starting_block: u64,
}

impl RegistryConfig {
    pub fn new(starting_block: u64) -> Self {
        Self { starting_block }
    }
}

type Population = Shared<BoxFuture<'static, Result<(), RegistryError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

struct Slot<E> {
    /// Position in the discovery order.
    seq: usize,
    entity: Arc<E>,
}

type EntityMap<E> = HashMap<Address, Slot<E>>;

struct RegistryState<E> {
    entities: Option<EntityMap<E>>,
    /// Evictions that arrived while the scan was still running.
    pending_evictions: HashSet<Address>,
    status: ScanStatus,
    /// Bumped by every scan.
    generation: u64,
}

struct RegistryInner<E: Entity> {
    source: Arc<dyn DiscoverySource>,
    factory: Arc<dyn EntityFactory<Entity = E>>,
    config: RegistryConfig,
    bus: EventBus,
    supervisor: TaskSupervisor,
    state: RwLock<RegistryState<E>>,
    initializing: AtomicBool,
    population: Mutex<Option<Population>>,
    evictions: EvictionQueue,
    /// Stops the eviction drain once the last handle is dropped.
    closed: CancellationToken,
}

impl<E: Entity> Drop for RegistryInner<E> {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Registry of entities discovered from deployment events.
///
/// Cloning yields another handle to the same registry; build one at startup
/// and hand clones to every consumer.
pub struct EntityRegistry<E: Entity> {
    inner: Arc<RegistryInner<E>>,
}

impl<E: Entity> Clone for EntityRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity> EntityRegistry<E> {
    /// Create a registry. Nothing is scanned until the first call to
    /// [`initialize`](Self::initialize) or
    /// [`ensure_initialized`](Self::ensure_initialized).
    ///
    /// Must be called within a tokio runtime: the eviction tasks are
    /// spawned here, on `supervisor`.
    pub fn new(
        source: Arc<dyn DiscoverySource>,
        factory: Arc<dyn EntityFactory<Entity = E>>,
        config: RegistryConfig,
        bus: EventBus,
        supervisor: TaskSupervisor,
    ) -> Self {
        let (evictions, queue) = EvictionQueue::channel();
        let bus_notices = bus.subscribe_corruption();

        let inner = Arc::new(RegistryInner {
            source,
            factory,
            config,
            bus,
            supervisor,
            state: RwLock::new(RegistryState {
                entities: None,
                pending_evictions: HashSet::new(),
                status: ScanStatus::NotStarted,
                generation: 0,
            }),
            initializing: AtomicBool::new(true),
            population: Mutex::new(None),
            evictions,
            closed: CancellationToken::new(),
        });

        eviction::spawn_drain(
            &inner.supervisor,
            Arc::downgrade(&inner),
            queue,
            bus_notices,
            inner.closed.clone(),
        );

        Self { inner }
    }

    /// Acquire the factory handle and populate the registry.
    ///
    /// Joins a scan already in flight and is a no-op after a successful
    /// one. After a failed scan this is the only way to try again.
    pub async fn initialize(&self) -> Result<(), RegistryError> {
        self.population(true).await
    }

    /// Wait for the one population scan, starting it if nobody has.
    ///
    /// Everyone waiting on a scan observes its outcome. A failed scan is not
    /// retried here: once it has concluded, this returns immediately and the
    /// registry stays empty.
    pub async fn ensure_initialized(&self) -> Result<(), RegistryError> {
        self.population(false).await
    }

    /// Wait for the scan, then for every entity present at that moment to
    /// finish its own setup. Entities that turn corrupt meanwhile are
    /// skipped without error.
    pub async fn ensure_all_initialized(&self) -> Result<(), RegistryError> {
        self.ensure_initialized().await?;

        let snapshot = self.entities();
        let outcomes =
            future::join_all(snapshot.iter().map(|entity| entity.ensure_initialized())).await;

        for (entity, outcome) in snapshot.iter().zip(outcomes) {
            if let Err(err) = outcome {
                debug!(address = %entity.address(), error = %err, "LBP did not finish initializing");
            }
        }
        Ok(())
    }

    /// Whether the population scan has yet to conclude.
    pub fn is_initializing(&self) -> bool {
        self.inner.initializing.load(Ordering::SeqCst)
    }

    /// Whether a scan has concluded and published a map (possibly empty).
    pub fn is_populated(&self) -> bool {
        self.inner.state.read().entities.is_some()
    }

    /// Look up a live entity.
    pub fn get(&self, address: &Address) -> Option<Arc<E>> {
        let state = self.inner.state.read();
        state
            .entities
            .as_ref()?
            .get(address)
            .filter(|slot| !slot.entity.is_corrupt())
            .map(|slot| Arc::clone(&slot.entity))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }

    /// Point-in-time snapshot of the live entities, in discovery order.
    pub fn entities(&self) -> Vec<Arc<E>> {
        let state = self.inner.state.read();
        let Some(entities) = state.entities.as_ref() else {
            return Vec::new();
        };

        let mut live: Vec<&Slot<E>> = entities
            .values()
            .filter(|slot| !slot.entity.is_corrupt())
            .collect();
        live.sort_by_key(|slot| slot.seq);
        live.into_iter().map(|slot| Arc::clone(&slot.entity)).collect()
    }

    /// Addresses of the live entities, in discovery order.
    pub fn addresses(&self) -> Vec<Address> {
        self.entities()
            .iter()
            .map(|entity| entity.address().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        let state = self.inner.state.read();
        state.entities.as_ref().map_or(0, |entities| {
            entities
                .values()
                .filter(|slot| !slot.entity.is_corrupt())
                .count()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the memoized population, creating it when none exists or when
    /// `retry_failed` is set and the last one failed.
    ///
    /// A running or successful scan is always reused, even once eviction has
    /// emptied the map.
    fn population(&self, retry_failed: bool) -> Population {
        let mut slot = self.inner.population.lock();

        if let Some(existing) = slot.as_ref() {
            let failed = self.inner.state.read().status == ScanStatus::Failed;
            if !failed {
                return existing.clone();
            }
            if !retry_failed {
                // The failure went to the waiters of that scan; later callers
                // just see the empty registry.
                return future::ready(Ok(())).boxed().shared();
            }
            info!("Retrying LBP registry population");
        }

        let generation = self.inner.begin_scan();
        let population = RegistryInner::spawn_population(&self.inner, generation);

        *slot = Some(population.clone());
        population
    }
}

impl<E: Entity> RegistryInner<E> {
    /// Reset the state for a new scan and return its generation.
    fn begin_scan(&self) -> u64 {
        let mut state = self.state.write();
        state.entities = None;
        state.pending_evictions.clear();
        state.status = ScanStatus::Running;
        state.generation += 1;
        self.initializing.store(true, Ordering::SeqCst);
        state.generation
    }

    fn spawn_population(inner: &Arc<Self>, generation: u64) -> Population {
        let span = tracing::info_span!(
            "lbp_registry_population",
            starting_block = inner.config.starting_block,
            generation,
        );
        let task = tokio::spawn(Arc::clone(inner).populate(generation).instrument(span));
        let registry = Arc::downgrade(inner);

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let err = RegistryError::Aborted(join_error.to_string());
                    if let Some(inner) = registry.upgrade() {
                        inner.conclude_failure(&err);
                    }
                    Err(err)
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn populate(self: Arc<Self>, generation: u64) -> Result<(), RegistryError> {
        match self.scan(generation).await {
            Ok(working) => {
                let count = self.publish(working);
                info!(count, "LBP registry populated");
                Ok(())
            }
            Err(err) => {
                let err = RegistryError::from(err);
                self.conclude_failure(&err);
                Err(err)
            }
        }
    }

    async fn scan(&self, generation: u64) -> Result<EntityMap<E>, DiscoveryError> {
        let factory = self.source.factory().await?;
        debug!(factory = %factory.address, name = %factory.name, "Acquired factory contract");

        let records = self
            .source
            .deployments(&factory, self.config.starting_block)
            .await?;

        let mut working = EntityMap::with_capacity(records.len());
        for (seq, record) in records.iter().enumerate() {
            if working.contains_key(&record.lbp_manager) {
                warn!(address = %record.lbp_manager, "Duplicate deployment record, keeping the first");
                continue;
            }

            let entity = match self.factory.create(record) {
                Ok(entity) => entity,
                Err(err) => {
                    warn!(address = %record.lbp_manager, error = %err, "Skipping LBP that could not be created");
                    self.bus
                        .publish_exception(format!("Failed to load LBP {}", record.lbp_manager), err);
                    continue;
                }
            };

            eviction::watch_corruption(
                &self.supervisor,
                entity.address().clone(),
                generation,
                entity.corrupt(),
                self.evictions.clone(),
            );
            info!("loaded LBP: {}", entity.address());
            self.start_initialization(&entity);

            working.insert(entity.address().clone(), Slot { seq, entity });
        }

        Ok(working)
    }

    /// Kick off the entity's own setup without waiting for it.
    fn start_initialization(&self, entity: &Arc<E>) {
        let entity = Arc::clone(entity);
        self.supervisor.spawn(
            format!("initialize:{}", entity.address().short()),
            async move { entity.initialize().await },
        );
    }

    /// Swap in the fully built map. Returns the number of live entities.
    fn publish(&self, mut working: EntityMap<E>) -> usize {
        let mut state = self.state.write();

        for address in state.pending_evictions.drain() {
            working.remove(&address);
        }
        working.retain(|_, slot| !slot.entity.is_corrupt());

        let count = working.len();
        state.entities = Some(working);
        state.status = ScanStatus::Succeeded;
        self.initializing.store(false, Ordering::SeqCst);
        count
    }

    fn conclude_failure(&self, err: &RegistryError) {
        {
            let mut state = self.state.write();
            state.entities = Some(EntityMap::new());
            state.pending_evictions.clear();
            state.status = ScanStatus::Failed;
            self.initializing.store(false, Ordering::SeqCst);
        }

        error!(error = %err, "LBP registry population failed");
        self.bus
            .publish_exception("Sorry, an error occurred", err.clone());
    }
}

impl<E: Entity> Evict for RegistryInner<E> {
    fn evict(&self, notice: &EvictionNotice) -> bool {
        let mut state = self.state.write();
        match notice.generation {
            Some(generation) if generation != state.generation => {
                debug!(
                    address = %notice.address,
                    generation,
                    current = state.generation,
                    "Ignoring corruption of an LBP from an earlier scan"
                );
                return false;
            }
            _ => {}
        }

        match state.entities.as_mut() {
            Some(entities) => {
                let removed = entities.remove(&notice.address).is_some();
                if removed {
                    warn!(address = %notice.address, "Evicted corrupt LBP");
                }
                removed
            }
            None => {
                state.pending_evictions.insert(notice.address.clone());
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "entity_registry_tests.rs"]
mod tests;
