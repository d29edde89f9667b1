//! DexScreener API integration
//!
//! Provides two lookups:
//! - SOL/USD reference price from the most liquid wrapped-SOL / USD-stable pair
//! - pool → token resolution for trades decoded without a mint
//!
//! ## API Reference
//!
//! - `GET {base}/latest/dex/tokens/{mint}` - pairs involving a token
//! - `GET {base}/latest/dex/pairs/solana/{pair}` - a single pair by address
//!
//! Both return `{ "pairs": [...] }` (`pairs` may be `null`).

use super::lookup::{PoolTokenResolver, ReferencePriceSource};
use super::types::WRAPPED_SOL_MINT;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.dexscreener.com";

const USD_STABLES: [&str; 2] = ["USDC", "USDT"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairsResponse {
    pub pairs: Option<Vec<DexScreenerPair>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexScreenerPair {
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: PairToken,
    #[serde(rename = "quoteToken")]
    pub quote_token: PairToken,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    pub liquidity: Option<Liquidity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairToken {
    pub address: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
}

pub struct DexScreenerClient {
    client: reqwest::Client,
    base_url: String,
}

impl DexScreenerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_pairs(&self, url: &str) -> Result<Vec<DexScreenerPair>, reqwest::Error> {
        let response: PairsResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.pairs.unwrap_or_default())
    }
}

/// SOL/USD from the most liquid SOL/USDC or SOL/USDT pair
pub fn select_sol_usd_price(pairs: &[DexScreenerPair]) -> Option<f64> {
    pairs
        .iter()
        .filter(|p| p.base_token.address == WRAPPED_SOL_MINT)
        .filter(|p| USD_STABLES.contains(&p.quote_token.symbol.as_str()))
        .filter_map(|p| {
            let price: f64 = p.price_usd.as_deref()?.parse().ok()?;
            let liquidity = p.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            (price.is_finite() && price > 0.0).then_some((price, liquidity))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(price, _)| price)
}

/// The non-SOL side of the pair
pub fn select_pool_token(pairs: &[DexScreenerPair], pool: &str) -> Option<String> {
    let pair = pairs
        .iter()
        .find(|p| p.pair_address == pool)
        .or_else(|| pairs.first())?;

    if pair.base_token.address != WRAPPED_SOL_MINT {
        Some(pair.base_token.address.clone())
    } else if pair.quote_token.address != WRAPPED_SOL_MINT {
        Some(pair.quote_token.address.clone())
    } else {
        None
    }
}

#[async_trait]
impl ReferencePriceSource for DexScreenerClient {
    async fn reference_price(&self) -> Option<f64> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, WRAPPED_SOL_MINT);

        match self.fetch_pairs(&url).await {
            Ok(pairs) => {
                let price = select_sol_usd_price(&pairs);
                if price.is_none() {
                    log::warn!("⚠️  No SOL/USD pair in DexScreener response");
                }
                price
            }
            Err(e) => {
                log::warn!("⚠️  DexScreener SOL/USD lookup failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl PoolTokenResolver for DexScreenerClient {
    async fn resolve_token(&self, pool: &str) -> Option<String> {
        let url = format!("{}/latest/dex/pairs/solana/{}", self.base_url, pool);

        match self.fetch_pairs(&url).await {
            Ok(pairs) => {
                let token = select_pool_token(&pairs, pool);
                if token.is_none() {
                    log::debug!("🔍 DexScreener has no pair for pool {}", pool);
                }
                token
            }
            Err(e) => {
                log::warn!("⚠️  DexScreener pool lookup failed for {}: {}", pool, e);
                None
            }
        }
    }
}
