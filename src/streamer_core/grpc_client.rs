use crate::monitor::types::DecodedTrade;
use crate::streamer_core::balance_extractor::{build_full_account_keys, extract_sol_changes, extract_token_changes};
use crate::streamer_core::config::RuntimeConfig;
use crate::streamer_core::connection::TradeStreamSource;
use crate::streamer_core::error_handler::StreamError;
use crate::streamer_core::trade_detector::{detect_platform, detect_trades, TxContext};
use async_trait::async_trait;
use futures::StreamExt;
use solana_signature::Signature;
use std::collections::HashMap;
use tokio::sync::mpsc;
use yellowstone_grpc_client::{ClientTlsConfig, GeyserGrpcClient};
use yellowstone_grpc_proto::geyser::{
    subscribe_update::UpdateOneof, SubscribeRequest, SubscribeRequestFilterTransactions, SubscribeUpdateTransaction,
};

/// Transaction subscription for the configured programs
///
/// Matches any transaction where a tracked program appears in the account
/// keys, which covers CPI invocations as well as top-level instructions.
pub fn build_subscribe_request(config: &RuntimeConfig, from_slot: Option<u64>) -> SubscribeRequest {
    let transaction_filter = SubscribeRequestFilterTransactions {
        vote: Some(false),
        failed: Some(false),
        signature: None,
        account_include: config.program_filters.clone(),
        account_exclude: vec![],
        account_required: vec![],
    };

    let mut transactions = HashMap::new();
    transactions.insert("monitor_programs".to_string(), transaction_filter);

    SubscribeRequest {
        accounts: HashMap::new(),
        slots: HashMap::new(),
        transactions,
        transactions_status: HashMap::new(),
        blocks: HashMap::new(),
        blocks_meta: HashMap::new(),
        entry: HashMap::new(),
        commitment: Some(config.commitment_level.into()),
        accounts_data_slice: vec![],
        ping: None,
        from_slot,
    }
}

/// Decode one transaction update into zero or more trades
///
/// Timestamps are arrival time; the slot is the checkpoint.
pub fn decode_transaction(update: &SubscribeUpdateTransaction, arrival_ms: i64) -> Vec<DecodedTrade> {
    let Some(info) = update.transaction.as_ref() else {
        return Vec::new();
    };
    let (Some(meta), Some(message)) = (
        info.meta.as_ref(),
        info.transaction.as_ref().and_then(|tx| tx.message.as_ref()),
    ) else {
        return Vec::new();
    };

    let signature = match Signature::try_from(info.signature.as_slice()) {
        Ok(sig) => sig.to_string(),
        Err(_) => {
            log::warn!("⚠️  Malformed signature at slot {}, skipping", update.slot);
            return Vec::new();
        }
    };

    let Some(account_keys) = build_full_account_keys(&message.account_keys, meta) else {
        log::warn!("⚠️  Malformed account keys in {}, skipping", signature);
        return Vec::new();
    };

    let ctx = TxContext {
        platform: detect_platform(&account_keys).unwrap_or("Unknown").to_string(),
        signature,
        slot: update.slot,
        timestamp_ms: arrival_ms,
    };

    let sol_deltas = extract_sol_changes(meta, &account_keys);
    let token_deltas = extract_token_changes(meta);

    detect_trades(&ctx, &sol_deltas, &token_deltas, &account_keys)
}

/// Yellowstone gRPC trade feed
pub struct YellowstoneTradeSource {
    config: RuntimeConfig,
}

impl YellowstoneTradeSource {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TradeStreamSource for YellowstoneTradeSource {
    async fn stream_trades(
        &self,
        from_checkpoint: Option<u64>,
        events: mpsc::Sender<DecodedTrade>,
    ) -> Result<(), StreamError> {
        let mut builder = GeyserGrpcClient::build_from_shared(self.config.geyser_url.clone())
            .map_err(|e| StreamError::Connect(format!("Failed to build client: {}", e)))?;

        if let Some(ref token) = self.config.x_token {
            builder = builder
                .x_token::<String>(Some(token.clone()))
                .map_err(|e| StreamError::Connect(format!("Failed to set x_token: {}", e)))?;
        }

        let mut client = builder
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|e| StreamError::Connect(format!("Failed to set tls config: {}", e)))?
            .connect()
            .await
            .map_err(|e| StreamError::Connect(format!("Failed to connect: {}", e)))?;

        log::info!("✅ Connected to gRPC server");

        let request = build_subscribe_request(&self.config, from_checkpoint);
        let mut stream = client
            .subscribe_once(request)
            .await
            .map_err(|e| StreamError::Subscribe(e.to_string()))?;

        log::info!(
            "📡 Subscribed to {} program(s) from slot {:?}",
            self.config.program_filters.len(),
            from_checkpoint
        );

        let mut tx_count = 0u64;

        while let Some(message) = stream.next().await {
            let update = message.map_err(|status| StreamError::Transport(status.to_string()))?;

            let Some(UpdateOneof::Transaction(tx_update)) = update.update_oneof else {
                continue;
            };

            tx_count += 1;
            if tx_count % 1_000 == 0 {
                log::debug!("📊 Processed {} transactions (slot {})", tx_count, tx_update.slot);
            }

            let arrival_ms = chrono::Utc::now().timestamp_millis();
            for trade in decode_transaction(&tx_update, arrival_ms) {
                if events.send(trade).await.is_err() {
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}
