//! bulut-daemon: the payment daemon.
//!
//! Single OS process running a Tokio async runtime. Clients talk to it
//! with JSON-RPC over a Unix socket; a background task pays due
//! subscriptions.

mod commands;
mod config;
mod events;
mod rpc;

use std::sync::Arc;
use std::time::Duration;

use bulut_alias::{AliasDirectory, AliasStore, MemoryAliasStore, SqliteAliasStore};
use bulut_execution::gateway::{HttpGateway, SimulatedGateway};
use bulut_execution::{
    Clock, Coordinator, ExecutionStore, MemoryLedger, SqliteLedger, SystemClock, TransferGateway,
};
use bulut_intent::parser::{IntentParser, LlmParser, PatternParser};
use bulut_scheduler::{
    MemorySubscriptionStore, Scheduler, SqliteSubscriptionStore, SubscriptionBook,
    SubscriptionStore,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::events::{Event, EventBus};
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Configuration.
    pub config: DaemonConfig,
    pub clock: Arc<dyn Clock>,
    pub aliases: AliasDirectory,
    /// Natural-language parser selected by configuration.
    pub parser: Arc<dyn IntentParser>,
    pub coordinator: Arc<Coordinator>,
    pub subscriptions: SubscriptionBook,
    /// "simulated" or "http".
    pub gateway_mode: &'static str,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    pub started_at: u64,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

struct Stores {
    aliases: Arc<dyn AliasStore>,
    ledger: Arc<dyn ExecutionStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
}

fn open_stores(config: &DaemonConfig) -> anyhow::Result<Stores> {
    if config.storage.in_memory {
        warn!("in-memory storage: nothing will survive a restart");
        return Ok(Stores {
            aliases: Arc::new(MemoryAliasStore::new()),
            ledger: Arc::new(MemoryLedger::new()),
            subscriptions: Arc::new(MemorySubscriptionStore::new()),
        });
    }

    let db_path = config.data_dir().join(bulut_db::DB_FILE_NAME);
    // One connection per store; WAL lets them share the file.
    Ok(Stores {
        aliases: Arc::new(SqliteAliasStore::new(bulut_db::open(&db_path)?)),
        ledger: Arc::new(SqliteLedger::new(bulut_db::open(&db_path)?)),
        subscriptions: Arc::new(SqliteSubscriptionStore::new(bulut_db::open(&db_path)?)),
    })
}

fn build_gateway(config: &DaemonConfig) -> anyhow::Result<(Arc<dyn TransferGateway>, &'static str)> {
    match config.gateway.mode.as_str() {
        "simulated" => Ok((Arc::new(SimulatedGateway::new()), "simulated")),
        "http" => {
            let gateway = HttpGateway::new(config.http_gateway())?;
            let mode = if gateway.is_simulated() { "simulated" } else { "http" };
            Ok((Arc::new(gateway), mode))
        }
        other => anyhow::bail!("unknown gateway mode {other:?}"),
    }
}

fn build_parser(config: &DaemonConfig) -> anyhow::Result<Arc<dyn IntentParser>> {
    match config.parser.backend.as_str() {
        "pattern" => Ok(Arc::new(PatternParser::new())),
        "llm" if config.parser.api_key.is_empty() => {
            warn!("LLM parser selected without an API key, using pattern parser");
            Ok(Arc::new(PatternParser::new()))
        }
        "llm" => Ok(Arc::new(LlmParser::new(
            config.parser.api_key.clone(),
            config.parser.api_url.clone(),
            config.parser.model.clone(),
        ))),
        other => anyhow::bail!("unknown parser backend {other:?}"),
    }
}

impl DaemonState {
    /// Wire stores, gateway, parser and coordinator from configuration.
    pub fn open(config: DaemonConfig, shutdown_tx: broadcast::Sender<()>) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let stores = open_stores(&config)?;
        let (gateway, gateway_mode) = build_gateway(&config)?;
        let parser = build_parser(&config)?;
        let coordinator = Arc::new(Coordinator::new(
            stores.ledger,
            gateway,
            clock.clone(),
            config.retry_policy(),
        ));

        Ok(Self {
            aliases: AliasDirectory::new(stores.aliases),
            subscriptions: SubscriptionBook::new(stores.subscriptions),
            parser,
            coordinator,
            gateway_mode,
            event_bus: EventBus::new(1000),
            started_at: clock.now(),
            clock,
            config,
            shutdown_tx,
        })
    }

    pub fn emit(&self, event_type: &str, payload: serde_json::Value) {
        self.event_bus
            .emit(Event::new(event_type, self.clock.now(), payload));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("bulut={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("Bulut daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Build daemon state
    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
    let state = Arc::new(DaemonState::open(config, shutdown_tx.clone())?);
    info!(
        gateway = state.gateway_mode,
        parser = state.parser.name(),
        "daemon state ready"
    );

    // 4. Resume unfinished executions now and periodically after
    let recovering = state.coordinator.clone();
    let interval = state.config.recovery_interval();
    let shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move { recovering.run_recovery(interval, shutdown).await });

    // 5. Start the subscription scheduler
    if state.config.scheduler.enabled {
        let scheduler = Scheduler::new(
            state.subscriptions.clone(),
            state.coordinator.clone(),
            state.clock.clone(),
        );
        let interval = Duration::from_secs(state.config.scheduler.tick_secs.max(1));
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { scheduler.run(interval, shutdown).await });
    }

    // 6. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    state.emit(
        "DaemonStarted",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        }),
    );

    // 7. Run the RPC server until shutdown
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown
    info!("Daemon shutting down gracefully");
    let _ = state.shutdown_tx.send(());

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
