//! Monitor ingestion - the single processing loop
//!
//! Everything that touches session state runs here. The `biased` select
//! polls control commands first, then lookup results, then timer fires,
//! and new trades last, so a trade backlog cannot delay a teardown.
//! A trade is only dispatched here; its point reaches sessions when the
//! matching `PointReady` arrives, so a point still pricing when its
//! session tears down is dropped.

use super::engine::{EngineReceivers, MonitorEngine, MonitorError};
use super::types::{CloseRequest, DecodedTrade, MonitorStats, SessionKey, StartRequest};
use crate::streamer_core::connection::StreamConnectionManager;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 1_024;

type Reply<T> = oneshot::Sender<Result<T, MonitorError>>;

enum Command {
    Start(StartRequest, Reply<SessionKey>),
    Close(CloseRequest, Reply<()>),
    IsMonitoring {
        wallet: String,
        token: String,
        reply: Reply<bool>,
    },
    Stats(Reply<MonitorStats>),
    Shutdown(Reply<()>),
}

/// Control surface for a running monitor. Cheap to clone.
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::Sender<Command>,
}

impl MonitorHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, MonitorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| MonitorError::EngineStopped)?;
        reply_rx.await.map_err(|_| MonitorError::EngineStopped)?
    }

    pub async fn start_monitoring(&self, request: StartRequest) -> Result<SessionKey, MonitorError> {
        self.request(|reply| Command::Start(request, reply)).await
    }

    pub async fn signal_close(&self, request: CloseRequest) -> Result<(), MonitorError> {
        self.request(|reply| Command::Close(request, reply)).await
    }

    pub async fn is_monitoring(&self, wallet: &str, token: &str) -> Result<bool, MonitorError> {
        let (wallet, token) = (wallet.to_string(), token.to_string());
        self.request(|reply| Command::IsMonitoring { wallet, token, reply })
            .await
    }

    pub async fn stats(&self) -> Result<MonitorStats, MonitorError> {
        self.request(Command::Stats).await
    }

    /// Stop the stream, end every live session (each gets persisted) and exit the loop
    pub async fn shutdown(&self) -> Result<(), MonitorError> {
        self.request(Command::Shutdown).await
    }
}

/// Spawn the processing loop
///
/// `stream`, when given, should already be started with the sender half of
/// `trades`; the loop stops it on shutdown. Pass `None` when something else
/// feeds the channel.
pub fn spawn_monitor(
    engine: MonitorEngine,
    receivers: EngineReceivers,
    trades: mpsc::Receiver<DecodedTrade>,
    stream: Option<StreamConnectionManager>,
) -> (MonitorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run_monitor_loop(engine, receivers, rx, trades, stream));
    (MonitorHandle { tx }, task)
}

async fn run_monitor_loop(
    mut engine: MonitorEngine,
    receivers: EngineReceivers,
    mut commands: mpsc::Receiver<Command>,
    mut trades: mpsc::Receiver<DecodedTrade>,
    mut stream: Option<StreamConnectionManager>,
) {
    let EngineReceivers {
        timers: mut timer_rx,
        events: mut event_rx,
    } = receivers;

    log::info!("🚀 Starting monitor ingestion");
    log::info!(
        "   └─ Upstream: {}",
        if stream.is_some() { "managed stream" } else { "external producer" }
    );

    let mut trades_open = true;
    let mut trade_count = 0u64;
    let mut last_log_time = std::time::Instant::now();

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                match command {
                    Some(Command::Shutdown(reply)) => {
                        stop_stream(&mut stream).await;
                        engine.shutdown().await;
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(command) => handle_command(&mut engine, command),
                    None => {
                        log::warn!("⚠️  All monitor handles dropped, shutting down");
                        stop_stream(&mut stream).await;
                        engine.shutdown().await;
                        break;
                    }
                }
            }

            Some(event) = event_rx.recv() => engine.handle_event(event),

            Some(fired) = timer_rx.recv() => engine.handle_timer(fired).await,

            trade = trades.recv(), if trades_open => {
                match trade {
                    Some(trade) => {
                        engine.handle_trade(trade);
                        trade_count += 1;

                        if last_log_time.elapsed().as_secs() >= 60 {
                            let stats = engine.stats();
                            log::info!(
                                "📊 Ingestion: {} trades | {} sessions on {} tokens | {} parked",
                                trade_count,
                                stats.live_sessions,
                                stats.monitored_tokens,
                                stats.pending_events
                            );
                            last_log_time = std::time::Instant::now();
                            trade_count = 0;
                        }
                    }
                    None => {
                        log::warn!("⚠️  Trade channel closed, serving control commands only");
                        trades_open = false;
                    }
                }
            }
        }
    }

    log::info!("✅ Monitor ingestion stopped");
}

fn handle_command(engine: &mut MonitorEngine, command: Command) {
    match command {
        Command::Start(request, reply) => {
            let _ = reply.send(engine.start_session(request));
        }
        Command::Close(request, reply) => {
            let _ = reply.send(engine.signal_close(request).map(|_| ()));
        }
        Command::IsMonitoring { wallet, token, reply } => {
            let _ = reply.send(Ok(engine.is_monitoring(&wallet, &token)));
        }
        Command::Stats(reply) => {
            let _ = reply.send(Ok(engine.stats()));
        }
        Command::Shutdown(reply) => {
            let _ = reply.send(Err(MonitorError::EngineStopped));
        }
    }
}

async fn stop_stream(stream: &mut Option<StreamConnectionManager>) {
    if let Some(manager) = stream.as_mut() {
        manager.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::db::{PersistenceError, PersistenceGateway};
    use crate::monitor::engine::{EngineDeps, EngineSettings};
    use crate::monitor::lookup::{PoolTokenResolver, ReferencePriceCache, SupplySource};
    use crate::monitor::price::PriceEngine;
    use crate::monitor::types::{PriceInput, SessionReport, Termination, TimeseriesPoint, TradeKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Duration;

    const OPEN_TS: i64 = 1_700_000_000_000;

    struct FixedSupply;

    #[async_trait]
    impl SupplySource for FixedSupply {
        async fn circulating_supply(&self, _token: &str) -> Option<f64> {
            Some(1_000_000.0)
        }
    }

    struct StaticResolver;

    #[async_trait]
    impl PoolTokenResolver for StaticResolver {
        async fn resolve_token(&self, pool: &str) -> Option<String> {
            (pool == "pool_1").then(|| "mint_1".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        reports: Mutex<Vec<SessionReport>>,
    }

    #[async_trait]
    impl PersistenceGateway for RecordingGateway {
        async fn persist_timeseries(&self, _key: &SessionKey, _points: &[TimeseriesPoint]) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn persist_summary(&self, report: &SessionReport) -> Result<(), PersistenceError> {
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    /// Helper to spawn a monitor without an upstream stream
    fn spawn_test_monitor(gateway: Arc<RecordingGateway>) -> (MonitorHandle, mpsc::Sender<DecodedTrade>, JoinHandle<()>) {
        let deps = EngineDeps {
            price: Arc::new(PriceEngine::new(ReferencePriceCache::with_price(100.0), Arc::new(FixedSupply))),
            resolver: Arc::new(StaticResolver),
            gateway,
        };
        let (engine, receivers) = MonitorEngine::new(deps, EngineSettings::default());
        let (trade_tx, trade_rx) = mpsc::channel(100);
        let (handle, task) = spawn_monitor(engine, receivers, trade_rx, None);
        (handle, trade_tx, task)
    }

    fn make_trade(token: Option<&str>, signature: &str, ts: i64, price_base: f64) -> DecodedTrade {
        DecodedTrade {
            platform: "PumpSwap".to_string(),
            kind: TradeKind::Buy,
            wallet: Some("someone".to_string()),
            token_address: token.map(String::from),
            pool_address: Some("pool_1".to_string()),
            price: PriceInput::Direct { price_base },
            signature: signature.to_string(),
            event_timestamp_ms: ts,
            checkpoint: 7,
        }
    }

    fn make_start() -> StartRequest {
        StartRequest {
            wallet: "wallet_1".to_string(),
            token: "mint_1".to_string(),
            pool: "pool_other".to_string(),
            max_duration_secs: 60,
            open_tx_id: "open_sig".to_string(),
            open_timestamp_ms: OPEN_TS,
            initial_point: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trades_flow_into_sessions() {
        // Test: trades flow through the channel into the live session
        let gateway = Arc::new(RecordingGateway::default());
        let (handle, trade_tx, _task) = spawn_test_monitor(gateway.clone());

        handle.start_monitoring(make_start()).await.unwrap();
        trade_tx.send(make_trade(Some("mint_1"), "sig_1", OPEN_TS + 1_000, 0.01)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.shutdown().await.unwrap();

        let reports = gateway.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].points.len(), 1);
        assert_eq!(reports[0].points[0].market_cap, Some(1_000_000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parked_trade_replayed_after_resolution() {
        // Test: pool-only trade waits for the lookup and is not lost
        let gateway = Arc::new(RecordingGateway::default());
        let (handle, trade_tx, _task) = spawn_test_monitor(gateway.clone());

        handle.start_monitoring(make_start()).await.unwrap();
        trade_tx.send(make_trade(None, "sig_pool", OPEN_TS + 2_000, 0.02)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.pending_events, 0);

        handle.shutdown().await.unwrap();
        let reports = gateway.reports.lock().unwrap();
        assert_eq!(reports[0].points[0].signature, "sig_pool");
    }

    #[derive(Default)]
    struct CountingSupply {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SupplySource for CountingSupply {
        async fn circulating_supply(&self, _token: &str) -> Option<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(1_000_000.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_torn_down_before_trade_backlog() {
        // Test: a due timer ends the session before queued trades are priced
        let gateway = Arc::new(RecordingGateway::default());
        let supply = Arc::new(CountingSupply::default());
        let deps = EngineDeps {
            price: Arc::new(PriceEngine::new(ReferencePriceCache::with_price(100.0), supply.clone())),
            resolver: Arc::new(StaticResolver),
            gateway: gateway.clone(),
        };
        let (mut engine, receivers) = MonitorEngine::new(deps, EngineSettings::default());

        let mut start = make_start();
        start.max_duration_secs = 1;
        engine.start_session(start).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let (trade_tx, trade_rx) = mpsc::channel(100);
        for i in 0..20 {
            let signature = format!("sig_{}", i);
            trade_tx
                .send(make_trade(Some("mint_1"), &signature, OPEN_TS + 1_000 + i, 0.01))
                .await
                .unwrap();
        }

        let (handle, _task) = spawn_monitor(engine, receivers, trade_rx, None);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!handle.is_monitoring("wallet_1", "mint_1").await.unwrap());
        assert_eq!(supply.calls.load(Ordering::SeqCst), 0);

        let reports = gateway.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].terminated_by, Termination::MaxDuration);
        assert!(reports[0].points.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_after_shutdown_report_engine_stopped() {
        let gateway = Arc::new(RecordingGateway::default());
        let (handle, _trade_tx, task) = spawn_test_monitor(gateway);

        handle.shutdown().await.unwrap();
        let _ = task.await;

        assert_eq!(handle.stats().await, Err(MonitorError::EngineStopped));
        assert_eq!(
            handle.is_monitoring("wallet_1", "mint_1").await,
            Err(MonitorError::EngineStopped)
        );
    }
}
