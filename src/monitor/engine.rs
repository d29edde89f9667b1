//! Monitor engine - owns all session state
//!
//! Every mutation happens on the single processing loop in `ingestion.rs`.
//! Lookups (pricing, pool resolution) run on spawned tasks and report back
//! through `EngineEvent`s; timer fires come back as `TimerFired`. Nothing
//! here is shared behind a lock.

use super::config::MonitorConfig;
use super::db::PersistenceGateway;
use super::lookup::PoolTokenResolver;
use super::peaks::PeakAnalyzer;
use super::price::PriceEngine;
use super::registry::{SessionRegistry, StartOutcome};
use super::router::{DropReason, EventRouter, RouteDecision};
use super::session::MonitoringSession;
use super::timers::{SessionTimers, TimerFired, TimerKind};
use super::types::{
    CloseRequest, DecodedTrade, MonitorStats, SessionKey, SessionReport, StartRequest, Termination,
    TimeseriesPoint, TradeKind,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("no open session for wallet {wallet} on token {token}")]
    SessionNotFound { wallet: String, token: String },

    #[error("monitor engine stopped")]
    EngineStopped,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Results of background lookups re-entering the processing loop
#[derive(Debug, Clone)]
pub enum EngineEvent {
    TokenResolved { pool: String, token: Option<String> },
    PointReady { token: String, point: TimeseriesPoint },
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub grace_period: Duration,
    pub default_max_duration: Duration,
    pub max_pending_per_pool: usize,
    pub watch_wallets: HashSet<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(super::peaks::GRACE_WINDOW_MS as u64),
            default_max_duration: Duration::from_secs(3_600),
            max_pending_per_pool: super::router::DEFAULT_MAX_PENDING_PER_POOL,
            watch_wallets: HashSet::new(),
        }
    }
}

impl From<&MonitorConfig> for EngineSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            grace_period: Duration::from_millis(config.grace_period_ms),
            default_max_duration: Duration::from_secs(config.default_max_duration_secs),
            max_pending_per_pool: config.max_pending_per_pool,
            watch_wallets: config.watch_wallets.iter().cloned().collect(),
        }
    }
}

/// External collaborators the engine calls out to
pub struct EngineDeps {
    pub price: Arc<PriceEngine>,
    pub resolver: Arc<dyn PoolTokenResolver>,
    pub gateway: Arc<dyn PersistenceGateway>,
}

/// Receivers the processing loop selects on
pub struct EngineReceivers {
    pub timers: mpsc::UnboundedReceiver<TimerFired>,
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
}

pub struct MonitorEngine {
    registry: SessionRegistry,
    router: EventRouter,
    timers: SessionTimers,
    analyzer: PeakAnalyzer,
    deps: EngineDeps,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    settings: EngineSettings,
    stopped: bool,
}

impl MonitorEngine {
    pub fn new(deps: EngineDeps, settings: EngineSettings) -> (Self, EngineReceivers) {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let engine = Self {
            registry: SessionRegistry::new(),
            router: EventRouter::new(settings.max_pending_per_pool),
            timers: SessionTimers::new(timer_tx),
            analyzer: PeakAnalyzer::new(settings.grace_period.as_millis() as i64),
            deps,
            events_tx,
            settings,
            stopped: false,
        };

        let receivers = EngineReceivers {
            timers: timer_rx,
            events: events_rx,
        };

        (engine, receivers)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Begin monitoring a position. Idempotent on the session key.
    pub fn start_session(&mut self, request: StartRequest) -> Result<SessionKey, MonitorError> {
        if self.stopped {
            return Err(MonitorError::EngineStopped);
        }
        if request.wallet.is_empty() || request.token.is_empty() || request.open_tx_id.is_empty() {
            return Err(MonitorError::InvalidRequest(
                "wallet, token and open signature are required".to_string(),
            ));
        }

        let max_duration = match request.max_duration_secs {
            0 => self.settings.default_max_duration,
            secs => Duration::from_secs(secs),
        };

        let session = MonitoringSession::new(
            SessionKey::new(request.wallet, request.token, request.open_timestamp_ms),
            request.pool,
            max_duration,
            request.open_tx_id,
            request.initial_point,
        );

        match self.registry.start_session(session) {
            StartOutcome::Created(key) => {
                self.timers.arm(key.clone(), TimerKind::MaxDuration, max_duration);
                log::info!("🚀 Monitoring started: {}", key);
                log::info!("   ├─ Max duration: {}s", max_duration.as_secs());
                log::info!("   └─ Live sessions: {}", self.registry.len());
                Ok(key)
            }
            StartOutcome::Existing(key) => {
                log::debug!("Session {} already live, ignoring duplicate start", key);
                Ok(key)
            }
        }
    }

    /// Signal the close of the most recent open session for wallet+token
    ///
    /// Swaps the max-duration timer for the grace timer.
    pub fn signal_close(&mut self, request: CloseRequest) -> Result<SessionKey, MonitorError> {
        if self.stopped {
            return Err(MonitorError::EngineStopped);
        }

        let key = self
            .registry
            .signal_close(
                &request.wallet,
                &request.token,
                request.close_tx_id,
                request.close_timestamp_ms,
                request.close_point,
            )
            .ok_or_else(|| MonitorError::SessionNotFound {
                wallet: request.wallet.clone(),
                token: request.token.clone(),
            })?;

        self.timers.arm(key.clone(), TimerKind::Grace, self.settings.grace_period);
        log::info!(
            "🔔 Close signaled: {} (grace {}ms)",
            key,
            self.settings.grace_period.as_millis()
        );

        Ok(key)
    }

    pub fn is_monitoring(&self, wallet: &str, token: &str) -> bool {
        self.registry.is_monitoring(wallet, token)
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            live_sessions: self.registry.len(),
            monitored_tokens: self.registry.token_count(),
            pending_events: self.router.pending_len(),
        }
    }

    /// Entry point for every decoded trade coming off the stream
    pub fn handle_trade(&mut self, trade: DecodedTrade) {
        if self.stopped {
            return;
        }

        self.dispatch(trade);
    }

    /// Watch-list detection, then routing. Replayed trades take this path too.
    fn dispatch(&mut self, trade: DecodedTrade) {
        if !self.settings.watch_wallets.is_empty() {
            self.detect_watched_position(&trade);
        }

        self.route(trade);
    }

    fn route(&mut self, trade: DecodedTrade) {
        let signature = trade.signature.clone();

        match self.router.route(trade, &self.registry) {
            RouteDecision::Deliver { token, trade } => self.spawn_pricing(token, trade),
            RouteDecision::Parked { pool, start_lookup } => {
                log::debug!("⏸️  Parked {} awaiting token for pool {}", signature, pool);
                if start_lookup {
                    self.spawn_resolution(pool);
                }
            }
            RouteDecision::Dropped(DropReason::Unmonitored) => {}
            RouteDecision::Dropped(DropReason::Unresolvable) => {
                log::debug!("🗑️  Dropped {}: no token or pool", signature);
            }
        }
    }

    fn spawn_pricing(&self, token: String, trade: DecodedTrade) {
        let price = Arc::clone(&self.deps.price);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            if let Some(point) = price.price_point(&trade, &token).await {
                // Closed channel means the engine shut down
                let _ = events.send(EngineEvent::PointReady { token, point });
            }
        });
    }

    fn spawn_resolution(&self, pool: String) {
        let resolver = Arc::clone(&self.deps.resolver);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let token = resolver.resolve_token(&pool).await;
            let _ = events.send(EngineEvent::TokenResolved { pool, token });
        });
    }

    /// Watch-list mode: a BUY opens a session, the next SELL closes it
    fn detect_watched_position(&mut self, trade: &DecodedTrade) {
        let Some(wallet) = trade.wallet.as_deref() else {
            return;
        };
        if !self.settings.watch_wallets.contains(wallet) {
            return;
        }

        let token = trade.token_address.clone().or_else(|| {
            trade
                .pool_address
                .as_deref()
                .and_then(|pool| {
                    self.router
                        .cached_token(pool)
                        .map(String::from)
                        .or_else(|| self.registry.token_for_pool(pool))
                })
        });
        let Some(token) = token else {
            log::debug!("Watched wallet {} traded on unknown token ({})", wallet, trade.signature);
            return;
        };

        let open = self.registry.find_open(wallet, &token);

        match (trade.kind, open) {
            (TradeKind::Buy, None) => {
                let request = StartRequest {
                    wallet: wallet.to_string(),
                    token,
                    pool: trade.pool_address.clone().unwrap_or_default(),
                    max_duration_secs: 0,
                    open_tx_id: trade.signature.clone(),
                    open_timestamp_ms: trade.event_timestamp_ms,
                    initial_point: None,
                };
                if let Err(e) = self.start_session(request) {
                    log::warn!("⚠️  Watch-list start failed: {}", e);
                }
            }
            (TradeKind::Sell, Some(_)) => {
                let request = CloseRequest {
                    wallet: wallet.to_string(),
                    token,
                    close_tx_id: trade.signature.clone(),
                    close_timestamp_ms: trade.event_timestamp_ms,
                    close_point: None,
                };
                if let Err(e) = self.signal_close(request) {
                    log::warn!("⚠️  Watch-list close failed: {}", e);
                }
            }
            _ => {}
        }
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        if self.stopped {
            return;
        }

        match event {
            EngineEvent::PointReady { token, point } => {
                let accepted = self.registry.record_point(&token, &point);
                log::debug!(
                    "📈 {} on {} recorded by {} session(s)",
                    point.signature,
                    token,
                    accepted
                );
            }
            EngineEvent::TokenResolved { pool, token } => {
                let replay = self.router.on_resolved(&pool, token.as_deref());
                if let Some(token) = &token {
                    log::debug!("🔍 Pool {} resolved to {} ({} parked)", pool, token, replay.len());
                }
                for trade in replay {
                    self.dispatch(trade);
                }
            }
        }
    }

    pub async fn handle_timer(&mut self, fired: TimerFired) {
        if !self.timers.accept(&fired) {
            log::debug!("Ignoring stale {:?} timer for {}", fired.kind, fired.key);
            return;
        }

        let termination = match fired.kind {
            TimerKind::MaxDuration => Termination::MaxDuration,
            TimerKind::Grace => Termination::GraceExpired,
        };

        self.end_session(&fired.key, termination).await;
    }

    /// Tear a session down: remove it, analyze it, hand it to persistence
    ///
    /// Persistence errors are logged; the session is gone either way.
    pub async fn end_session(&mut self, key: &SessionKey, terminated_by: Termination) -> Option<SessionReport> {
        self.timers.cancel(key);
        let mut session = self.registry.remove_session(key)?;
        session.terminate();

        let (summary, points) = self.analyzer.analyze(&session);

        let report = SessionReport {
            key: session.key.clone(),
            pool_address: session.pool_address.clone(),
            open_tx_id: session.open_tx_id.clone(),
            close_tx_id: session.close_tx_id.clone(),
            summary,
            points,
            terminated_by,
        };

        if let Err(e) = self.deps.gateway.persist_timeseries(&report.key, &report.points).await {
            log::error!("❌ Failed to persist timeseries for {}: {}", report.key, e);
        }
        if let Err(e) = self.deps.gateway.persist_summary(&report).await {
            log::error!("❌ Failed to persist summary for {}: {}", report.key, e);
        }

        log::info!("✅ Session ended: {} ({})", report.key, terminated_by.as_str());
        log::info!(
            "   ├─ Peak before close: {:?}",
            report.summary.peak_before_close.as_ref().and_then(|p| p.price_quote)
        );
        log::info!(
            "   ├─ Peak after close: {:?}",
            report.summary.peak_after_close.as_ref().and_then(|p| p.price_quote)
        );
        log::info!(
            "   └─ Points: {} | competing: {} before, {} in grace",
            report.points.len(),
            report.summary.competing_trades_before_close,
            report.summary.competing_trades_within_grace_window
        );

        Some(report)
    }

    /// Cancel all timers and end every live session. Idempotent.
    pub async fn shutdown(&mut self) -> Vec<SessionReport> {
        if self.stopped {
            return Vec::new();
        }

        log::info!("🛑 Shutting down monitor ({} live sessions)", self.registry.len());
        self.stopped = true;
        self.timers.cancel_all();

        let mut reports = Vec::new();
        for key in self.registry.keys() {
            if let Some(report) = self.end_session(&key, Termination::Shutdown).await {
                reports.push(report);
            }
        }
        self.router.clear();

        reports
    }
}
