//! Core data types shared by the monitor engine
//!
//! - `DecodedTrade` - normalized swap event coming off the stream
//! - `TimeseriesPoint` - one priced observation attributed to a session
//! - `PeakSummary` / `PeakPoint` - derived per-session statistics
//! - `SessionKey` - composite identity (wallet + token + open timestamp)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wrapped SOL mint (the base asset every tracked pool is priced against)
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Trade direction as seen from the trader's wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Buy,
    Sell,
}

impl From<TradeKind> for &'static str {
    fn from(kind: TradeKind) -> &'static str {
        match kind {
            TradeKind::Buy => "BUY",
            TradeKind::Sell => "SELL",
        }
    }
}

/// Role of an observation relative to the session it was attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Open,
    Close,
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "OPEN",
            EventKind::Close => "CLOSE",
            EventKind::Other => "OTHER",
        }
    }
}

/// Raw price fields attached to a decoded trade
///
/// Reserves are expressed in UI units: `base_reserve` is the token side,
/// `quote_reserve` the SOL side of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PriceInput {
    Reserves { base_reserve: f64, quote_reserve: f64 },
    Direct { price_base: f64 },
}

/// Normalized trade event delivered by the stream decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedTrade {
    /// Source platform label (e.g. "PumpSwap")
    pub platform: String,
    pub kind: TradeKind,
    /// Trader wallet (fee payer), when known
    pub wallet: Option<String>,
    /// Token mint; `None` when it must be resolved from the pool
    pub token_address: Option<String>,
    pub pool_address: Option<String>,
    pub price: PriceInput,
    pub signature: String,
    /// Event time in unix milliseconds
    pub event_timestamp_ms: i64,
    /// Upstream progress marker (slot)
    pub checkpoint: u64,
}

/// One priced observation. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub timestamp_ms: i64,
    pub price_base: Option<f64>,
    pub price_quote: Option<f64>,
    /// `None` only when the supply or reference price lookup failed
    pub market_cap: Option<f64>,
    pub pool_address: String,
    pub signature: String,
    pub kind: EventKind,
}

impl TimeseriesPoint {
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Price snapshot reported as a phase peak
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakPoint {
    pub price_base: Option<f64>,
    pub price_quote: Option<f64>,
    pub market_cap: Option<f64>,
    pub timestamp_ms: i64,
}

impl From<&TimeseriesPoint> for PeakPoint {
    fn from(point: &TimeseriesPoint) -> Self {
        Self {
            price_base: point.price_base,
            price_quote: point.price_quote,
            market_cap: point.market_cap,
            timestamp_ms: point.timestamp_ms,
        }
    }
}

/// Summary statistics computed once per session at teardown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakSummary {
    pub peak_before_close: Option<PeakPoint>,
    pub peak_after_close: Option<PeakPoint>,
    pub competing_trades_before_close: u32,
    pub competing_trades_within_grace_window: u32,
}

/// Composite session identity
///
/// The open timestamp disambiguates re-entries of the same wallet into the
/// same token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub wallet: String,
    pub token: String,
    pub open_timestamp_ms: i64,
}

impl SessionKey {
    pub fn new(wallet: impl Into<String>, token: impl Into<String>, open_timestamp_ms: i64) -> Self {
        Self {
            wallet: wallet.into(),
            token: token.into(),
            open_timestamp_ms,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.wallet, self.token, self.open_timestamp_ms)
    }
}

/// Why a session reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    MaxDuration,
    GraceExpired,
    Shutdown,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::MaxDuration => "max_duration",
            Termination::GraceExpired => "grace_expired",
            Termination::Shutdown => "shutdown",
        }
    }
}

/// Everything handed to the persistence gateway for one finished session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub key: SessionKey,
    pub pool_address: String,
    pub open_tx_id: String,
    pub close_tx_id: Option<String>,
    pub summary: PeakSummary,
    /// Chronological, deduplicated, strictly after the open timestamp
    pub points: Vec<TimeseriesPoint>,
    pub terminated_by: Termination,
}

/// Start request for the control surface
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub wallet: String,
    pub token: String,
    pub pool: String,
    /// Zero falls back to the configured default
    pub max_duration_secs: u64,
    pub open_tx_id: String,
    pub open_timestamp_ms: i64,
    pub initial_point: Option<TimeseriesPoint>,
}

/// Close request for the control surface
#[derive(Debug, Clone, PartialEq)]
pub struct CloseRequest {
    pub wallet: String,
    pub token: String,
    pub close_tx_id: String,
    pub close_timestamp_ms: i64,
    pub close_point: Option<TimeseriesPoint>,
}

/// Snapshot of engine occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub live_sessions: usize,
    pub monitored_tokens: usize,
    pub pending_events: usize,
}
