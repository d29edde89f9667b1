//! Stream connection lifecycle
//!
//! `StreamConnectionManager` owns one background task that keeps a
//! subscription alive: every time the source ends or fails it waits the
//! reconnect delay and subscribes again from the last checkpoint seen.

use crate::monitor::types::DecodedTrade;
use crate::streamer_core::error_handler::{ReconnectPolicy, StreamError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One subscription to an upstream trade feed
///
/// Implementations decode updates and push them into `events` until the
/// upstream ends (`Ok`) or fails (`Err`). A closed `events` channel means the
/// consumer is gone and the source should return `Ok` promptly.
#[async_trait]
pub trait TradeStreamSource: Send + Sync + 'static {
    async fn stream_trades(
        &self,
        from_checkpoint: Option<u64>,
        events: mpsc::Sender<DecodedTrade>,
    ) -> Result<(), StreamError>;
}

pub struct StreamConnectionManager {
    source: Arc<dyn TradeStreamSource>,
    reconnect_delay_ms: u64,
    initial_checkpoint: Option<u64>,
    /// 0 = nothing seen yet
    checkpoint: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl StreamConnectionManager {
    pub fn new(source: Arc<dyn TradeStreamSource>, reconnect_delay_ms: u64, resume_from: Option<u64>) -> Self {
        Self {
            source,
            reconnect_delay_ms,
            initial_checkpoint: resume_from,
            checkpoint: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Start streaming into `sink`. Calling it again while running is a no-op.
    pub fn start(&mut self, sink: mpsc::Sender<DecodedTrade>) {
        if self.is_running() {
            log::warn!("⚠️  Stream already running, ignoring start");
            return;
        }

        log::info!("🚀 Starting stream connection manager");

        self.task = Some(tokio::spawn(run_connection_loop(
            self.source.clone(),
            self.reconnect_delay_ms,
            self.initial_checkpoint,
            self.checkpoint.clone(),
            sink,
        )));
    }

    /// Stop the background task. Safe to call when not running.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            log::info!("🛑 Stream connection manager stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Highest checkpoint forwarded so far
    pub fn last_checkpoint(&self) -> Option<u64> {
        match self.checkpoint.load(Ordering::SeqCst) {
            0 => None,
            slot => Some(slot),
        }
    }
}

impl Drop for StreamConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_connection_loop(
    source: Arc<dyn TradeStreamSource>,
    reconnect_delay_ms: u64,
    initial_checkpoint: Option<u64>,
    checkpoint: Arc<AtomicU64>,
    sink: mpsc::Sender<DecodedTrade>,
) {
    let mut policy = ReconnectPolicy::new(reconnect_delay_ms);

    loop {
        let resume_from = match checkpoint.load(Ordering::SeqCst) {
            0 => initial_checkpoint,
            slot => Some(slot),
        };

        log::info!("🔗 Subscribing (resume from: {:?})", resume_from);

        let (inner_tx, mut inner_rx) = mpsc::channel::<DecodedTrade>(sink.max_capacity());

        let (sink_ref, checkpoint_ref) = (&sink, &checkpoint);
        // Owns the receiver so a stopped forwarder unblocks the source
        let forward = async move {
            let (sink, checkpoint) = (sink_ref, checkpoint_ref);
            let mut forwarded = 0u64;
            while let Some(trade) = inner_rx.recv().await {
                let slot = trade.checkpoint;
                if sink.send(trade).await.is_err() {
                    return (forwarded, false);
                }
                checkpoint.fetch_max(slot, Ordering::SeqCst);
                forwarded += 1;
            }
            (forwarded, true)
        };

        let (result, (forwarded, sink_open)) = tokio::join!(source.stream_trades(resume_from, inner_tx), forward);

        if !sink_open {
            log::info!("📭 Trade consumer closed, stopping stream");
            return;
        }

        if forwarded > 0 {
            policy.reset();
        }

        match result {
            Ok(()) => log::warn!("⚠️  Stream ended after {} events", forwarded),
            Err(e) => log::error!("❌ Stream error after {} events: {}", forwarded, e),
        }

        policy.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{PriceInput, TradeKind};
    use std::sync::Mutex;
    use std::time::Duration;

    fn make_trade(signature: &str, slot: u64) -> DecodedTrade {
        DecodedTrade {
            platform: "PumpSwap".to_string(),
            kind: TradeKind::Buy,
            wallet: Some("wallet_1".to_string()),
            token_address: Some("token_1".to_string()),
            pool_address: None,
            price: PriceInput::Direct { price_base: 1.0 },
            signature: signature.to_string(),
            event_timestamp_ms: 1_000,
            checkpoint: slot,
        }
    }

    /// First subscription yields two trades then fails; later ones idle
    struct FlakySource {
        requests: Mutex<Vec<Option<u64>>>,
    }

    #[async_trait]
    impl TradeStreamSource for FlakySource {
        async fn stream_trades(
            &self,
            from_checkpoint: Option<u64>,
            events: mpsc::Sender<DecodedTrade>,
        ) -> Result<(), StreamError> {
            let attempt = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(from_checkpoint);
                requests.len()
            };

            if attempt == 1 {
                let _ = events.send(make_trade("sig_1", 100)).await;
                let _ = events.send(make_trade("sig_2", 105)).await;
                return Err(StreamError::Transport("connection reset".to_string()));
            }

            events.closed().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resumes_from_checkpoint() {
        let source = Arc::new(FlakySource {
            requests: Mutex::new(Vec::new()),
        });
        let mut manager = StreamConnectionManager::new(source.clone(), 2_000, Some(42));
        let (tx, mut rx) = mpsc::channel(16);

        manager.start(tx);

        assert_eq!(rx.recv().await.unwrap().signature, "sig_1");
        assert_eq!(rx.recv().await.unwrap().signature, "sig_2");

        tokio::time::sleep(Duration::from_millis(2_500)).await;

        assert_eq!(manager.last_checkpoint(), Some(105));
        assert_eq!(*source.requests.lock().unwrap(), vec![Some(42), Some(105)]);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_is_safe() {
        let source = Arc::new(FlakySource {
            requests: Mutex::new(Vec::new()),
        });
        let mut manager = StreamConnectionManager::new(source.clone(), 2_000, None);

        // Stop before start
        manager.stop().await;
        assert!(!manager.is_running());
        assert_eq!(manager.last_checkpoint(), None);

        let (tx, mut rx) = mpsc::channel(16);
        manager.start(tx.clone());
        manager.start(tx);
        assert!(manager.is_running());

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        manager.stop().await;
        manager.stop().await;
        assert!(!manager.is_running());

        // Only one subscription was opened by the two start calls
        assert_eq!(source.requests.lock().unwrap()[0], None);
        assert_eq!(source.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_sink_stops_manager() {
        let source = Arc::new(FlakySource {
            requests: Mutex::new(Vec::new()),
        });
        let mut manager = StreamConnectionManager::new(source, 2_000, None);
        let (tx, rx) = mpsc::channel(16);

        drop(rx);
        manager.start(tx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!manager.is_running());
    }
}
