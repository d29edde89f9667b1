//! Monitor configuration from environment variables

use std::env;
use std::str::FromStr;

/// Configuration for the monitor engine and its collaborators
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `.sql` schema files
    pub schema_dir: String,

    /// Channel buffer size between the stream and the engine (trades)
    pub channel_buffer: usize,

    /// Post-close grace window in milliseconds
    pub grace_period_ms: u64,

    /// Max duration used when a start request passes zero
    pub default_max_duration_secs: u64,

    /// Reference price refresh interval in milliseconds
    pub price_interval_ms: u64,

    pub supply_cache_ttl_secs: u64,

    /// Parked events kept per unresolved pool
    pub max_pending_per_pool: usize,

    pub rpc_url: String,

    pub dexscreener_base_url: String,

    /// Wallets whose BUY/SELL trades open and close sessions automatically
    pub watch_wallets: Vec<String>,
}

fn parse_or<T: FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl MonitorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SOLPEAK_DB_PATH` (default: solpeak.db)
    /// - `SOLPEAK_SCHEMA_DIR` (default: sql)
    /// - `STREAMER_CHANNEL_BUFFER` (default: 10000)
    /// - `GRACE_PERIOD_MS` (default: 10000)
    /// - `DEFAULT_MAX_DURATION_SECS` (default: 3600)
    /// - `PRICE_UPDATE_INTERVAL_MS` (default: 30000)
    /// - `SUPPLY_CACHE_TTL_SECS` (default: 300)
    /// - `MAX_PENDING_PER_POOL` (default: 256)
    /// - `SOLANA_RPC_URL` (default: mainnet-beta public RPC)
    /// - `DEXSCREENER_BASE_URL` (default: https://api.dexscreener.com)
    /// - `WATCH_WALLETS` (comma-separated, default: empty)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("SOLPEAK_DB_PATH").unwrap_or_else(|_| "solpeak.db".to_string()),

            schema_dir: env::var("SOLPEAK_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),

            channel_buffer: parse_or("STREAMER_CHANNEL_BUFFER", 10_000),

            grace_period_ms: parse_or("GRACE_PERIOD_MS", 10_000),

            default_max_duration_secs: parse_or("DEFAULT_MAX_DURATION_SECS", 3_600),

            price_interval_ms: parse_or("PRICE_UPDATE_INTERVAL_MS", 30_000),

            supply_cache_ttl_secs: parse_or("SUPPLY_CACHE_TTL_SECS", 300),

            max_pending_per_pool: parse_or("MAX_PENDING_PER_POOL", 256),

            rpc_url: env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),

            dexscreener_base_url: env::var("DEXSCREENER_BASE_URL")
                .unwrap_or_else(|_| super::dexscreener::DEFAULT_BASE_URL.to_string()),

            watch_wallets: env::var("WATCH_WALLETS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|w| !w.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}
