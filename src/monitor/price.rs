//! Price derivation for decoded trades
//!
//! ```text
//! priceBase  = quoteReserve / baseReserve   (or the reported price)
//! priceQuote = priceBase * referencePrice
//! marketCap  = priceQuote * circulatingSupply
//! ```
//!
//! A bad base price rejects the whole point. A missing reference price or
//! supply only nulls the fields that depend on it.

use super::lookup::{ReferencePriceCache, SupplySource};
use super::types::{DecodedTrade, EventKind, PriceInput, TimeseriesPoint};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSnapshot {
    pub price_base: f64,
    pub price_quote: Option<f64>,
    pub market_cap: Option<f64>,
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Price in the base asset, or `None` if the inputs are unusable
pub fn derive_price_base(input: &PriceInput) -> Option<f64> {
    match *input {
        PriceInput::Reserves {
            base_reserve,
            quote_reserve,
        } => {
            let base = positive(base_reserve)?;
            let quote = positive(quote_reserve)?;
            positive(quote / base)
        }
        PriceInput::Direct { price_base } => positive(price_base),
    }
}

pub fn compute_snapshot(
    input: &PriceInput,
    reference_price: Option<f64>,
    supply: Option<f64>,
) -> Option<PriceSnapshot> {
    let price_base = derive_price_base(input)?;

    let price_quote = reference_price
        .and_then(positive)
        .and_then(|reference| positive(price_base * reference));

    let market_cap = match (price_quote, supply.and_then(positive)) {
        (Some(quote), Some(supply)) => positive(quote * supply),
        _ => None,
    };

    Some(PriceSnapshot {
        price_base,
        price_quote,
        market_cap,
    })
}

pub struct PriceEngine {
    reference: ReferencePriceCache,
    supply: Arc<dyn SupplySource>,
}

impl PriceEngine {
    pub fn new(reference: ReferencePriceCache, supply: Arc<dyn SupplySource>) -> Self {
        Self { reference, supply }
    }

    /// Build the observation for `trade` on `token`
    ///
    /// Supply is only fetched when a quote price exists to multiply it with.
    pub async fn price_point(&self, trade: &DecodedTrade, token: &str) -> Option<TimeseriesPoint> {
        if derive_price_base(&trade.price).is_none() {
            log::debug!(
                "🗑️  Rejecting {} on {}: unusable price input {:?}",
                trade.signature,
                token,
                trade.price
            );
            return None;
        }

        let reference = self.reference.get();
        let supply = match reference {
            Some(_) => self.supply.circulating_supply(token).await,
            None => None,
        };

        let snapshot = compute_snapshot(&trade.price, reference, supply)?;

        Some(TimeseriesPoint {
            timestamp_ms: trade.event_timestamp_ms,
            price_base: Some(snapshot.price_base),
            price_quote: snapshot.price_quote,
            market_cap: snapshot.market_cap,
            pool_address: trade.pool_address.clone().unwrap_or_default(),
            signature: trade.signature.clone(),
            kind: EventKind::Other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::TradeKind;
    use async_trait::async_trait;

    struct FixedSupply(Option<f64>);

    #[async_trait]
    impl SupplySource for FixedSupply {
        async fn circulating_supply(&self, _token: &str) -> Option<f64> {
            self.0
        }
    }

    fn make_trade(price: PriceInput) -> DecodedTrade {
        DecodedTrade {
            platform: "PumpSwap".to_string(),
            kind: TradeKind::Buy,
            wallet: Some("trader".to_string()),
            token_address: Some("mint_1".to_string()),
            pool_address: Some("pool_1".to_string()),
            price,
            signature: "sig_1".to_string(),
            event_timestamp_ms: 1_700_000_000_000,
            checkpoint: 42,
        }
    }

    #[test]
    fn test_reserves_ratio() {
        let input = PriceInput::Reserves {
            base_reserve: 1_000_000.0,
            quote_reserve: 50.0,
        };
        assert_eq!(derive_price_base(&input), Some(0.00005));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let zero_base = PriceInput::Reserves {
            base_reserve: 0.0,
            quote_reserve: 50.0,
        };
        assert_eq!(derive_price_base(&zero_base), None);
        assert_eq!(derive_price_base(&PriceInput::Direct { price_base: -1.0 }), None);
        assert_eq!(derive_price_base(&PriceInput::Direct { price_base: f64::INFINITY }), None);
        assert_eq!(derive_price_base(&PriceInput::Direct { price_base: f64::NAN }), None);
    }

    #[test]
    fn test_market_cap_null_on_bad_supply() {
        // Test: never report 0 market cap
        let input = PriceInput::Direct { price_base: 0.001 };

        for supply in [None, Some(0.0), Some(-5.0), Some(f64::NAN)] {
            let snapshot = compute_snapshot(&input, Some(150.0), supply).unwrap();
            assert_eq!(snapshot.price_quote, Some(0.15));
            assert_eq!(snapshot.market_cap, None);
        }
    }

    #[test]
    fn test_full_snapshot() {
        let input = PriceInput::Direct { price_base: 0.002 };
        let snapshot = compute_snapshot(&input, Some(100.0), Some(1_000_000.0)).unwrap();

        assert_eq!(snapshot.price_base, 0.002);
        assert_eq!(snapshot.price_quote, Some(0.2));
        assert_eq!(snapshot.market_cap, Some(200_000.0));
    }

    #[tokio::test]
    async fn test_price_point_without_reference_keeps_base_price() {
        let engine = PriceEngine::new(ReferencePriceCache::new(), Arc::new(FixedSupply(Some(1e9))));

        let point = engine
            .price_point(&make_trade(PriceInput::Direct { price_base: 0.001 }), "mint_1")
            .await
            .unwrap();

        assert_eq!(point.price_base, Some(0.001));
        assert_eq!(point.price_quote, None);
        assert_eq!(point.market_cap, None);
        assert_eq!(point.kind, EventKind::Other);
    }

    #[tokio::test]
    async fn test_price_point_carries_trade_identity() {
        let engine = PriceEngine::new(ReferencePriceCache::with_price(200.0), Arc::new(FixedSupply(Some(1_000.0))));

        let point = engine
            .price_point(&make_trade(PriceInput::Direct { price_base: 0.5 }), "mint_1")
            .await
            .unwrap();

        assert_eq!(point.signature, "sig_1");
        assert_eq!(point.pool_address, "pool_1");
        assert_eq!(point.timestamp_ms, 1_700_000_000_000);
        assert_eq!(point.price_quote, Some(100.0));
        assert_eq!(point.market_cap, Some(100_000.0));
    }

    #[tokio::test]
    async fn test_price_point_rejects_corrupt_trade() {
        let engine = PriceEngine::new(ReferencePriceCache::with_price(200.0), Arc::new(FixedSupply(None)));

        let point = engine
            .price_point(&make_trade(PriceInput::Direct { price_base: 0.0 }), "mint_1")
            .await;
        assert!(point.is_none());
    }
}
