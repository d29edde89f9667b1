//! External lookups consumed by the engine
//!
//! - `ReferencePriceSource` - SOL/USD reference price
//! - `SupplySource` - circulating supply per token
//! - `PoolTokenResolver` - pool address → token mint
//!
//! All three degrade to `None` on failure; callers never see transport errors.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait ReferencePriceSource: Send + Sync {
    async fn reference_price(&self) -> Option<f64>;
}

#[async_trait]
pub trait SupplySource: Send + Sync {
    async fn circulating_supply(&self, token: &str) -> Option<f64>;
}

#[async_trait]
pub trait PoolTokenResolver: Send + Sync {
    async fn resolve_token(&self, pool: &str) -> Option<String>;
}

fn usable(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Last known reference price, shared between the refresher and the PriceEngine
#[derive(Debug, Clone, Default)]
pub struct ReferencePriceCache {
    value: Arc<RwLock<Option<f64>>>,
}

impl ReferencePriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(price: f64) -> Self {
        let cache = Self::new();
        cache.set(price);
        cache
    }

    pub fn get(&self) -> Option<f64> {
        self.value.read().ok().and_then(|guard| *guard)
    }

    /// Store `price` if it is positive and finite
    pub fn set(&self, price: f64) -> bool {
        if !usable(price) {
            return false;
        }
        match self.value.write() {
            Ok(mut guard) => {
                *guard = Some(price);
                true
            }
            Err(_) => false,
        }
    }

    /// Pull a fresh value; the previous one is kept when the source fails
    pub async fn refresh(&self, source: &dyn ReferencePriceSource) -> bool {
        match source.reference_price().await {
            Some(price) => self.set(price),
            None => false,
        }
    }
}

/// TTL cache in front of a `SupplySource`. Misses are never cached.
pub struct CachedSupplySource {
    inner: Arc<dyn SupplySource>,
    ttl: Duration,
    entries: Mutex<HashMap<String, (f64, Instant)>>,
}

impl CachedSupplySource {
    pub fn new(inner: Arc<dyn SupplySource>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, token: &str) -> Option<f64> {
        let entries = self.entries.lock().ok()?;
        let hit = entries
            .get(token)
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.ttl)
            .map(|(supply, _)| *supply);
        hit
    }
}

#[async_trait]
impl SupplySource for CachedSupplySource {
    async fn circulating_supply(&self, token: &str) -> Option<f64> {
        if let Some(supply) = self.cached(token) {
            return Some(supply);
        }

        let supply = self.inner.circulating_supply(token).await.filter(|s| usable(*s))?;

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(token.to_string(), (supply, Instant::now()));
        }
        Some(supply)
    }
}

/// `getTokenSupply` over Solana JSON-RPC
pub struct RpcSupplySource {
    client: reqwest::Client,
    rpc_url: String,
}

impl RpcSupplySource {
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }

    async fn fetch_supply(&self, token: &str) -> Result<Option<f64>, reqwest::Error> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTokenSupply",
            "params": [token, { "commitment": "confirmed" }],
        });

        let response: serde_json::Value = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_token_supply(&response))
    }
}

/// Extract `result.value.uiAmount` from a `getTokenSupply` response
pub fn parse_token_supply(response: &serde_json::Value) -> Option<f64> {
    let value = response.get("result")?.get("value")?;

    value
        .get("uiAmount")
        .and_then(|v| v.as_f64())
        .or_else(|| {
            value
                .get("uiAmountString")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
        })
}

#[async_trait]
impl SupplySource for RpcSupplySource {
    async fn circulating_supply(&self, token: &str) -> Option<f64> {
        match self.fetch_supply(token).await {
            Ok(Some(supply)) if usable(supply) => Some(supply),
            Ok(_) => {
                log::debug!("⚠️  No usable supply for {}", token);
                None
            }
            Err(e) => {
                log::warn!("⚠️  getTokenSupply failed for {}: {}", token, e);
                None
            }
        }
    }
}
