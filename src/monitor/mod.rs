//! # Position monitor
//!
//! Tracks, for a bounded set of (wallet, token) positions, the price and
//! market-cap trajectory of the token from the opening trade through a short
//! grace window after the first close.
//!
//! ## Architecture
//!
//! ```text
//! StreamConnectionManager ──▶ trade channel ──▶ ingestion loop (MonitorEngine)
//!                                                   │
//!                      EventRouter ◀────────────────┤
//!                         │  (pool lookups)         │
//!                      PriceEngine ──▶ SessionRegistry ──▶ MonitoringSession
//!                                                   │
//!                              timers ──▶ end_session ──▶ PeakAnalyzer
//!                                                   │
//!                                          PersistenceGateway (SQLite)
//! ```
//!
//! All session state lives in the engine and is only touched from the
//! ingestion loop. Lookups run concurrently and re-enter the loop as events.
//!
//! ## Module Organization
//!
//! - `types` - Core data structures (DecodedTrade, TimeseriesPoint, SessionKey)
//! - `session` - Per-position state machine
//! - `registry` - Live sessions and the token index
//! - `router` - Trade routing and the pending pool-lookup queue
//! - `price` - Price/market-cap derivation
//! - `peaks` - Peak and competing-trade analysis
//! - `timers` - Cancellable max-duration / grace timers
//! - `lookup` / `dexscreener` - External price, supply and pool lookups
//! - `db` - Persistence gateway trait and SQLite writer
//! - `engine` / `ingestion` - Engine and the processing loop with its handle
//! - `scheduler` - Reference price refresher
//! - `config` - Environment configuration

pub mod config;
pub mod db;
pub mod dexscreener;
pub mod engine;
pub mod ingestion;
pub mod lookup;
pub mod peaks;
pub mod price;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod timers;
pub mod types;

// Re-export commonly used types
pub use config::MonitorConfig;
pub use db::{PersistenceError, PersistenceGateway, SqliteSessionWriter};
pub use engine::{EngineDeps, EngineSettings, MonitorEngine, MonitorError};
pub use ingestion::{spawn_monitor, MonitorHandle};
pub use lookup::{PoolTokenResolver, ReferencePriceCache, ReferencePriceSource, SupplySource};
pub use peaks::PeakAnalyzer;
pub use price::PriceEngine;
pub use types::{
    CloseRequest, DecodedTrade, MonitorStats, PeakPoint, PeakSummary, SessionKey, SessionReport, StartRequest,
    Termination, TimeseriesPoint,
};
