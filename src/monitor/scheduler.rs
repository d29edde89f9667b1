//! Background schedulers
//!
//! The reference price is refreshed off the processing loop; the PriceEngine
//! only ever reads the cached value.

use super::lookup::{ReferencePriceCache, ReferencePriceSource};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Price scheduler task - periodically refresh the SOL/USD reference price
///
/// The first refresh happens immediately. Failures keep the last good value.
///
/// This function runs indefinitely until cancelled.
pub async fn reference_price_task(
    cache: ReferencePriceCache,
    source: Arc<dyn ReferencePriceSource>,
    price_interval_ms: u64,
) {
    log::info!("💰 Starting reference price scheduler (interval: {}ms)", price_interval_ms);

    let mut timer = interval(Duration::from_millis(price_interval_ms.max(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        if cache.refresh(source.as_ref()).await {
            log::debug!("💰 Reference price updated: {:?}", cache.get());
        } else {
            match cache.get() {
                Some(last) => log::warn!("⚠️  Reference price refresh failed, keeping {:.4}", last),
                None => log::warn!("⚠️  Reference price unavailable (quote prices will be null)"),
            }
        }
    }
}
