//! Monitor Runtime
//!
//! Wires the Yellowstone trade stream into the position monitor:
//! - Applies the SQLite schema and opens the session writer
//! - Starts the reference price refresher and lookup clients
//! - Runs the ingestion loop until CTRL+C, then shuts down gracefully
//!
//! Usage:
//!   cargo run --release --bin monitor_runtime
//!
//! Environment variables:
//!   GEYSER_URL - Yellowstone endpoint (required)
//!   X_TOKEN - Yellowstone auth token
//!   SOLPEAK_DB_PATH - SQLite database path (default: solpeak.db)
//!   WATCH_WALLETS - Wallets whose buys/sells open and close sessions

use dotenv::dotenv;
use log::{error, info};
use rusqlite::Connection;
use solpeak::monitor::{
    config::MonitorConfig,
    db::{run_schema_migrations, PersistenceGateway, SqliteSessionWriter},
    dexscreener::DexScreenerClient,
    engine::{EngineDeps, EngineSettings, MonitorEngine},
    ingestion::spawn_monitor,
    lookup::{CachedSupplySource, ReferencePriceCache, RpcSupplySource, SupplySource},
    price::PriceEngine,
    scheduler::reference_price_task,
    types::DecodedTrade,
};
use solpeak::streamer_core::{RuntimeConfig, StreamConnectionManager, YellowstoneTradeSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    info!("🚀 Monitor Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let runtime_config = RuntimeConfig::from_env()?;
    let config = MonitorConfig::from_env();

    info!("✅ Configuration loaded");
    info!("   ├─ Geyser: {}", runtime_config.geyser_url);
    info!("   ├─ Programs: {}", runtime_config.program_filters.len());
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Grace period: {}ms", config.grace_period_ms);
    info!("   ├─ Default max duration: {}s", config.default_max_duration_secs);
    info!("   └─ Watched wallets: {}", config.watch_wallets.len());

    info!("🔧 Initializing database...");
    let mut conn = Connection::open(&config.db_path)?;
    run_schema_migrations(&mut conn, &config.schema_dir)?;
    drop(conn);

    let gateway: Arc<dyn PersistenceGateway> = Arc::new(SqliteSessionWriter::new(&config.db_path)?);
    info!("✅ Database initialized");

    let dexscreener = Arc::new(DexScreenerClient::new(config.dexscreener_base_url.clone())?);
    let rpc_supply: Arc<dyn SupplySource> = Arc::new(RpcSupplySource::new(config.rpc_url.clone())?);
    let supply: Arc<dyn SupplySource> = Arc::new(CachedSupplySource::new(
        rpc_supply,
        Duration::from_secs(config.supply_cache_ttl_secs),
    ));

    let reference = ReferencePriceCache::new();
    tokio::spawn(reference_price_task(
        reference.clone(),
        dexscreener.clone(),
        config.price_interval_ms,
    ));

    let deps = EngineDeps {
        price: Arc::new(PriceEngine::new(reference, supply)),
        resolver: dexscreener,
        gateway,
    };
    let (engine, receivers) = MonitorEngine::new(deps, EngineSettings::from(&config));
    info!("✅ MonitorEngine created");

    let (trade_tx, trade_rx) = mpsc::channel::<DecodedTrade>(config.channel_buffer);

    let mut stream = StreamConnectionManager::new(
        Arc::new(YellowstoneTradeSource::new(runtime_config.clone())),
        runtime_config.reconnect_delay_ms,
        runtime_config.resume_from_slot,
    );
    stream.start(trade_tx);

    let (handle, monitor_task) = spawn_monitor(engine, receivers, trade_rx, Some(stream));

    info!("✅ Monitor running");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    if let Err(e) = handle.shutdown().await {
        error!("❌ Shutdown failed: {}", e);
    }

    if let Err(e) = monitor_task.await {
        error!("❌ Monitor task ended abnormally: {}", e);
    }

    info!("✅ Monitor runtime stopped");
    Ok(())
}
