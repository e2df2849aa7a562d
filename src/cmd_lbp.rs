//! LBP subcommand handlers for Prime Launch.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::oneshot;
use tracing::info;

use primelaunch_config::Config;
use primelaunch_core::{
    AppEvent, EntityLoader, EntityRegistry, EventBus, LbpManager, LbpManagerFactory,
    RegistryConfig, TaskSupervisor,
};
use primelaunch_protocols::{Address, Entity};

use crate::fixture::FixtureSource;

/// Everything one command needs, wired from the config.
struct Services {
    bus: EventBus,
    supervisor: TaskSupervisor,
    registry: EntityRegistry<LbpManager>,
}

impl Services {
    fn start(config: &Config, source: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let fixture = Arc::new(FixtureSource::load(source)?);
        let bus = EventBus::new(config.events.capacity);
        let supervisor = TaskSupervisor::new(bus.clone());
        let factory = LbpManagerFactory::new(fixture.clone(), bus.clone());
        let starting_block = config.network.starting_block();

        info!(network = %config.network.name, starting_block, source = %source.display(), "Starting LBP registry");

        let registry = EntityRegistry::<LbpManager>::new(
            fixture,
            Arc::new(factory),
            RegistryConfig::new(starting_block),
            bus.clone(),
            supervisor.clone(),
        );

        Ok(Self {
            bus,
            supervisor,
            registry,
        })
    }

    async fn stop(self) {
        self.supervisor.shutdown().await;
    }
}

#[derive(Serialize)]
struct LbpSummary {
    address: Address,
    name: Option<String>,
    admin: Address,
    block_number: u64,
    metadata: String,
}

impl LbpSummary {
    fn from_lbp(lbp: &LbpManager) -> Self {
        Self {
            address: lbp.address().clone(),
            name: lbp.name(),
            admin: lbp.admin().clone(),
            block_number: lbp.block_number(),
            metadata: lbp.metadata_ref().to_string(),
        }
    }
}

/// Discover every LBP, wait for their setup and print the valid ones.
pub(crate) async fn lbp_list(
    config: &Config,
    source: &Path,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::start(config, source)?;

    let outcome = services.registry.ensure_all_initialized().await;
    let lbps: Vec<_> = services
        .registry
        .entities()
        .iter()
        .map(|lbp| LbpSummary::from_lbp(lbp))
        .collect();
    services.stop().await;
    outcome?;

    if lbps.is_empty() {
        println!("No LBPs found.");
        return Ok(());
    }

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&lbps)?;
            println!("{}", json);
        }
        _ => {
            println!("{:<44} {:<30} {:>10}  {}", "ADDRESS", "NAME", "BLOCK", "ADMIN");
            println!("{}", "-".repeat(130));
            for lbp in &lbps {
                println!(
                    "{:<44} {:<30} {:>10}  {}",
                    lbp.address,
                    lbp.name.as_deref().unwrap_or("-"),
                    lbp.block_number,
                    lbp.admin
                );
            }
            println!("\nTotal: {} LBP(s)", lbps.len());
        }
    }

    Ok(())
}

/// Console line for an event, if it has one.
fn describe(event: &AppEvent) -> Option<String> {
    match event {
        AppEvent::Loading(true) => Some("Loading…".to_string()),
        AppEvent::Loading(false) => Some("Done.".to_string()),
        AppEvent::Exception(exception) => Some(format!("Error: {}", exception)),
        AppEvent::EntityCorrupt(_) => None,
    }
}

/// Pass events to `emit` until `stop` fires, then flush whatever was
/// published before it.
async fn echo_events(
    mut events: broadcast::Receiver<AppEvent>,
    mut stop: oneshot::Receiver<()>,
    mut emit: impl FnMut(String),
) {
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => {
                    if let Some(line) = describe(&event) {
                        emit(line);
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return,
            },
            _ = &mut stop => break,
        }
    }

    loop {
        match events.try_recv() {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    emit(line);
                }
            }
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return,
        }
    }
}

/// Load one LBP the way a page would, echoing loading and error events.
pub(crate) async fn lbp_show(
    config: &Config,
    source: &Path,
    address: &Address,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::start(config, source)?;

    let (stop, stopped) = oneshot::channel();
    let echo = tokio::spawn(echo_events(
        services.bus.subscribe(),
        stopped,
        |line| eprintln!("{}", line),
    ));

    let loader = EntityLoader::new(
        services.registry.clone(),
        services.bus.clone(),
        config.loader.loading_delay(),
    );
    let outcome = loader.load(address).await;

    let _ = stop.send(());
    let _ = echo.await;
    services.stop().await;

    let lbp = outcome?;
    println!("Address:   {}", lbp.address());
    println!("Admin:     {}", lbp.admin());
    println!("Block:     {}", lbp.block_number());
    println!("Metadata:  {}", lbp.metadata_ref());
    if let Some(metadata) = lbp.metadata() {
        println!("Name:      {}", metadata.name);
        if !metadata.description.is_empty() {
            println!("About:     {}", metadata.description);
        }
        if let Some(website) = metadata.website {
            println!("Website:   {}", website);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "cmd_lbp_tests.rs"]
mod tests;
