//! Mock collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use primelaunch_protocols::{
    Address, DeploymentRecord, DiscoveryError, DiscoverySource, Entity, EntityError,
    EntityFactory, FactoryHandle, LBP_MANAGER_FACTORY, MetadataRef,
};

use crate::events::AppEvent;
use crate::lbp::{LbpMetadata, MetadataResolver};
use crate::state::{EntityState, InitPhase};

pub const STARTING_BLOCK: u64 = 9_423_409;

pub fn addr(n: u64) -> Address {
    Address::parse(&format!("0x{:040x}", n)).unwrap()
}

pub fn record(n: u64) -> DeploymentRecord {
    DeploymentRecord::new(
        STARTING_BLOCK + n,
        addr(n),
        addr(1000 + n),
        MetadataRef::new(format!("QmLaunch{}", n)),
    )
}

pub fn records(count: u64) -> Vec<DeploymentRecord> {
    (1..=count).map(record).collect()
}

/// Drain every event published so far.
pub fn drain(rx: &mut broadcast::Receiver<AppEvent>) -> Vec<AppEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn loading_events(events: &[AppEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|event| match event {
            AppEvent::Loading(loading) => Some(*loading),
            _ => None,
        })
        .collect()
}

pub fn exception_count(events: &[AppEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, AppEvent::Exception(_)))
        .count()
}

/// Discovery source backed by a fixed record list.
pub struct MockSource {
    records: Vec<DeploymentRecord>,
    failure: Option<String>,
    latency: Duration,
    factory_calls: AtomicUsize,
    query_calls: AtomicUsize,
    from_blocks: Mutex<Vec<u64>>,
}

impl MockSource {
    pub fn with_records(records: Vec<DeploymentRecord>) -> Self {
        Self {
            records,
            failure: None,
            latency: Duration::ZERO,
            factory_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            from_blocks: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut source = Self::with_records(Vec::new());
        source.failure = Some(message.to_string());
        source
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn factory_calls(&self) -> usize {
        self.factory_calls.load(Ordering::SeqCst)
    }

    pub fn from_blocks(&self) -> Vec<u64> {
        self.from_blocks.lock().clone()
    }
}

#[async_trait]
impl DiscoverySource for MockSource {
    async fn factory(&self) -> Result<FactoryHandle, DiscoveryError> {
        self.factory_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FactoryHandle::new(LBP_MANAGER_FACTORY, addr(999)))
    }

    async fn deployments(
        &self,
        _factory: &FactoryHandle,
        from_block: u64,
    ) -> Result<Vec<DeploymentRecord>, DiscoveryError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        self.from_blocks.lock().push(from_block);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.failure {
            Some(message) => Err(DiscoveryError::Unreachable(message.clone())),
            None => Ok(self.records.clone()),
        }
    }
}

/// Entity whose setup is driven by the test.
///
/// With an init delay it becomes ready on its own; without one it stays
/// initializing until [`complete`](Self::complete) or
/// [`corrupt_now`](Self::corrupt_now) is called.
#[derive(Debug)]
pub struct MockEntity {
    address: Address,
    state: EntityState,
    init_delay: Option<Duration>,
    init_started: AtomicBool,
}

impl MockEntity {
    pub fn new(address: Address, init_delay: Option<Duration>) -> Self {
        Self {
            address,
            state: EntityState::new(),
            init_delay,
            init_started: AtomicBool::new(false),
        }
    }

    pub fn init_started(&self) -> bool {
        self.init_started.load(Ordering::SeqCst)
    }

    pub fn complete(&self) {
        self.state.mark_ready();
    }

    pub fn corrupt_now(&self) {
        self.state.mark_corrupt();
        self.state.mark_failed();
    }
}

#[async_trait]
impl Entity for MockEntity {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn initialize(&self) -> Result<(), EntityError> {
        self.init_started.store(true, Ordering::SeqCst);
        if let Some(delay) = self.init_delay {
            tokio::time::sleep(delay).await;
            self.state.mark_ready();
        }
        self.state.wait_initialized().await;
        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<(), EntityError> {
        match self.state.wait_initialized().await {
            InitPhase::Ready if !self.state.is_corrupt() => Ok(()),
            _ => Err(EntityError::Corrupt(self.address.clone())),
        }
    }

    fn is_initializing(&self) -> bool {
        self.state.is_initializing()
    }

    fn corrupt(&self) -> watch::Receiver<bool> {
        self.state.corrupt_receiver()
    }
}

/// Factory that records every entity it builds.
#[derive(Default)]
pub struct MockFactory {
    init_delay: Option<Duration>,
    rejected: HashSet<Address>,
    /// Panics once when asked to build this address.
    panic_once: Mutex<Option<Address>>,
    created: Mutex<Vec<Arc<MockEntity>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn reject(mut self, address: Address) -> Self {
        self.rejected.insert(address);
        self
    }

    pub fn panic_once_on(self, address: Address) -> Self {
        *self.panic_once.lock() = Some(address);
        self
    }

    pub fn created(&self) -> Vec<Arc<MockEntity>> {
        self.created.lock().clone()
    }

    pub fn entity(&self, address: &Address) -> Arc<MockEntity> {
        self.created
            .lock()
            .iter()
            .find(|e| e.address() == address)
            .cloned()
            .unwrap()
    }
}

impl EntityFactory for MockFactory {
    type Entity = MockEntity;

    fn create(&self, record: &DeploymentRecord) -> Result<Arc<MockEntity>, EntityError> {
        let panic_now = {
            let mut panic_once = self.panic_once.lock();
            if panic_once.as_ref() == Some(&record.lbp_manager) {
                panic_once.take()
            } else {
                None
            }
        };
        if let Some(address) = panic_now {
            panic!("factory crashed on {}", address);
        }
        if self.rejected.contains(&record.lbp_manager) {
            return Err(EntityError::Construction {
                address: record.lbp_manager.clone(),
                message: "rejected by test".to_string(),
            });
        }
        let entity = Arc::new(MockEntity::new(record.lbp_manager.clone(), self.init_delay));
        self.created.lock().push(Arc::clone(&entity));
        Ok(entity)
    }
}

/// Metadata resolver backed by a map.
#[derive(Default)]
pub struct StaticResolver {
    documents: HashMap<MetadataRef, LbpMetadata>,
    latency: Duration,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reference: &str, name: &str) -> Self {
        self.documents.insert(
            MetadataRef::new(reference),
            LbpMetadata {
                name: name.to_string(),
                description: String::new(),
                website: None,
                extra: HashMap::new(),
            },
        );
        self
    }

    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl MetadataResolver for StaticResolver {
    async fn resolve(&self, reference: &MetadataRef) -> Result<LbpMetadata, EntityError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.documents
            .get(reference)
            .cloned()
            .ok_or_else(|| EntityError::MetadataUnavailable(reference.to_string()))
    }
}
