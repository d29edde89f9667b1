//! Event router
//!
//! Decides, per decoded trade, whether it goes straight to pricing, waits for
//! an async pool → token lookup, or is dropped:
//!
//! ```text
//!   trade ──▶ token known? ── yes ──▶ monitored? ── yes ──▶ Deliver
//!                │                        └── no ──▶ Dropped
//!                └─ no ──▶ pool cached / live pool? ──▶ (same as above)
//!                              └─ no ──▶ park under pool (first park starts a lookup)
//! ```
//!
//! Parked trades are replayed in arrival order once the lookup finishes.

use super::registry::SessionRegistry;
use super::types::DecodedTrade;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_MAX_PENDING_PER_POOL: usize = 256;
pub const DEFAULT_MAX_CACHED_POOLS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Token is known but nothing monitors it
    Unmonitored,
    /// Neither a token nor a pool to resolve from
    Unresolvable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    Deliver { token: String, trade: DecodedTrade },
    /// `start_lookup` is true only for the first trade parked under the pool
    Parked { pool: String, start_lookup: bool },
    Dropped(DropReason),
}

#[derive(Debug)]
pub struct EventRouter {
    pending: HashMap<String, VecDeque<DecodedTrade>>,
    resolved_pools: HashMap<String, String>,
    max_pending_per_pool: usize,
    max_cached_pools: usize,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_PER_POOL)
    }
}

impl EventRouter {
    pub fn new(max_pending_per_pool: usize) -> Self {
        Self {
            pending: HashMap::new(),
            resolved_pools: HashMap::new(),
            max_pending_per_pool: max_pending_per_pool.max(1),
            max_cached_pools: DEFAULT_MAX_CACHED_POOLS,
        }
    }

    pub fn route(&mut self, mut trade: DecodedTrade, registry: &SessionRegistry) -> RouteDecision {
        let token = match trade.token_address.clone() {
            Some(token) => token,
            None => {
                let Some(pool) = trade.pool_address.clone() else {
                    return RouteDecision::Dropped(DropReason::Unresolvable);
                };

                let known = self
                    .resolved_pools
                    .get(&pool)
                    .cloned()
                    .or_else(|| registry.token_for_pool(&pool));

                match known {
                    Some(token) => {
                        trade.token_address = Some(token.clone());
                        token
                    }
                    None => return self.park(pool, trade),
                }
            }
        };

        if registry.is_token_monitored(&token) {
            RouteDecision::Deliver { token, trade }
        } else {
            RouteDecision::Dropped(DropReason::Unmonitored)
        }
    }

    fn park(&mut self, pool: String, trade: DecodedTrade) -> RouteDecision {
        let start_lookup = !self.pending.contains_key(&pool);
        let queue = self.pending.entry(pool.clone()).or_default();

        if queue.len() >= self.max_pending_per_pool {
            log::warn!(
                "⚠️  Pending queue full for pool {} ({} events), dropping oldest",
                pool,
                queue.len()
            );
            queue.pop_front();
        }
        queue.push_back(trade);

        RouteDecision::Parked { pool, start_lookup }
    }

    /// Finish a lookup for `pool`
    ///
    /// On success the resolution is cached and the parked trades come back
    /// in arrival order with their token filled in. On failure they are
    /// discarded.
    pub fn on_resolved(&mut self, pool: &str, token: Option<&str>) -> Vec<DecodedTrade> {
        let parked = self.pending.remove(pool).unwrap_or_default();

        let Some(token) = token else {
            if !parked.is_empty() {
                log::debug!(
                    "🗑️  Pool {} unresolved, discarding {} parked events",
                    pool,
                    parked.len()
                );
            }
            return Vec::new();
        };

        if self.resolved_pools.len() >= self.max_cached_pools {
            self.resolved_pools.clear();
        }
        self.resolved_pools.insert(pool.to_string(), token.to_string());

        parked
            .into_iter()
            .map(|mut trade| {
                trade.token_address = Some(token.to_string());
                trade
            })
            .collect()
    }

    pub fn cached_token(&self, pool: &str) -> Option<&str> {
        self.resolved_pools.get(pool).map(String::as_str)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::session::MonitoringSession;
    use crate::monitor::types::{PriceInput, SessionKey, TradeKind};
    use std::time::Duration;

    fn make_trade(token: Option<&str>, pool: Option<&str>, signature: &str) -> DecodedTrade {
        DecodedTrade {
            platform: "PumpSwap".to_string(),
            kind: TradeKind::Buy,
            wallet: Some("trader".to_string()),
            token_address: token.map(String::from),
            pool_address: pool.map(String::from),
            price: PriceInput::Direct { price_base: 0.001 },
            signature: signature.to_string(),
            event_timestamp_ms: 2_000,
            checkpoint: 100,
        }
    }

    fn registry_with(token: &str, pool: &str) -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        registry.start_session(MonitoringSession::new(
            SessionKey::new("wallet_1", token, 1_000),
            pool.to_string(),
            Duration::from_secs(60),
            "open".to_string(),
            None,
        ));
        registry
    }

    #[test]
    fn test_known_token_is_delivered() {
        let registry = registry_with("mint_1", "pool_1");
        let mut router = EventRouter::default();

        let decision = router.route(make_trade(Some("mint_1"), None, "sig"), &registry);
        assert!(matches!(decision, RouteDecision::Deliver { ref token, .. } if token == "mint_1"));
    }

    #[test]
    fn test_unmonitored_token_is_dropped() {
        let registry = registry_with("mint_1", "pool_1");
        let mut router = EventRouter::default();

        let decision = router.route(make_trade(Some("mint_2"), None, "sig"), &registry);
        assert_eq!(decision, RouteDecision::Dropped(DropReason::Unmonitored));
    }

    #[test]
    fn test_no_token_no_pool_is_unresolvable() {
        let registry = SessionRegistry::new();
        let mut router = EventRouter::default();

        let decision = router.route(make_trade(None, None, "sig"), &registry);
        assert_eq!(decision, RouteDecision::Dropped(DropReason::Unresolvable));
    }

    #[test]
    fn test_live_session_pool_short_circuits_lookup() {
        let registry = registry_with("mint_1", "pool_1");
        let mut router = EventRouter::default();

        match router.route(make_trade(None, Some("pool_1"), "sig"), &registry) {
            RouteDecision::Deliver { token, trade } => {
                assert_eq!(token, "mint_1");
                assert_eq!(trade.token_address.as_deref(), Some("mint_1"));
            }
            other => panic!("expected delivery, got {:?}", other),
        }
    }

    #[test]
    fn test_only_first_park_starts_lookup() {
        // Test: single outstanding lookup per pool
        let registry = SessionRegistry::new();
        let mut router = EventRouter::default();

        let first = router.route(make_trade(None, Some("pool_x"), "sig_1"), &registry);
        let second = router.route(make_trade(None, Some("pool_x"), "sig_2"), &registry);

        assert!(matches!(first, RouteDecision::Parked { start_lookup: true, .. }));
        assert!(matches!(second, RouteDecision::Parked { start_lookup: false, .. }));
        assert_eq!(router.pending_len(), 2);
    }

    #[test]
    fn test_resolution_replays_in_arrival_order() {
        let registry = SessionRegistry::new();
        let mut router = EventRouter::default();
        router.route(make_trade(None, Some("pool_x"), "sig_1"), &registry);
        router.route(make_trade(None, Some("pool_x"), "sig_2"), &registry);

        let replayed = router.on_resolved("pool_x", Some("mint_x"));

        let sigs: Vec<&str> = replayed.iter().map(|t| t.signature.as_str()).collect();
        assert_eq!(sigs, vec!["sig_1", "sig_2"]);
        assert!(replayed.iter().all(|t| t.token_address.as_deref() == Some("mint_x")));
        assert_eq!(router.pending_len(), 0);
        assert_eq!(router.cached_token("pool_x"), Some("mint_x"));
    }

    #[test]
    fn test_cached_pool_skips_parking() {
        let registry = registry_with("mint_x", "pool_other");
        let mut router = EventRouter::default();
        router.on_resolved("pool_x", Some("mint_x"));

        let decision = router.route(make_trade(None, Some("pool_x"), "sig"), &registry);
        assert!(matches!(decision, RouteDecision::Deliver { .. }));
    }

    #[test]
    fn test_failed_resolution_discards_parked() {
        let registry = SessionRegistry::new();
        let mut router = EventRouter::default();
        router.route(make_trade(None, Some("pool_x"), "sig_1"), &registry);

        assert!(router.on_resolved("pool_x", None).is_empty());
        assert_eq!(router.pending_len(), 0);
        assert!(router.cached_token("pool_x").is_none());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let registry = SessionRegistry::new();
        let mut router = EventRouter::new(2);
        for sig in ["sig_1", "sig_2", "sig_3"] {
            router.route(make_trade(None, Some("pool_x"), sig), &registry);
        }

        let replayed = router.on_resolved("pool_x", Some("mint_x"));
        let sigs: Vec<&str> = replayed.iter().map(|t| t.signature.as_str()).collect();
        assert_eq!(sigs, vec!["sig_2", "sig_3"]);
    }
}
