//! Peak analysis run once per session at teardown
//!
//! Points are ordered by event timestamp (never arrival order), deduplicated,
//! and split around the close:
//!
//! ```text
//!   open ──── before ────▶ close ── afterGrace (≤ close + grace) ──▶
//! ```
//!
//! Each partition reports its highest quote price and the number of
//! competing trades (anything that is not the position's own open/close).

use super::session::MonitoringSession;
use super::types::{PeakPoint, PeakSummary, TimeseriesPoint};
use std::collections::HashSet;

/// Grace window after the close still attributed to after-close tracking
pub const GRACE_WINDOW_MS: i64 = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct PeakAnalyzer {
    grace_window_ms: i64,
}

impl Default for PeakAnalyzer {
    fn default() -> Self {
        Self::new(GRACE_WINDOW_MS)
    }
}

impl PeakAnalyzer {
    pub fn new(grace_window_ms: i64) -> Self {
        Self { grace_window_ms }
    }

    /// Open-filtered, chronologically sorted, deduplicated points
    ///
    /// The sort is stable, so among equal timestamps the first-arrived
    /// duplicate wins.
    pub fn prepare_points(&self, session: &MonitoringSession) -> Vec<TimeseriesPoint> {
        let open_ts = session.key.open_timestamp_ms;

        let mut points: Vec<TimeseriesPoint> = session
            .data_points()
            .iter()
            .filter(|p| p.timestamp_ms > open_ts)
            .cloned()
            .collect();
        points.sort_by_key(|p| p.timestamp_ms);

        let mut seen = HashSet::new();
        points.retain(|p| seen.insert(p.signature.clone()));
        points
    }

    /// Compute the session summary and the point list to persist
    pub fn analyze(&self, session: &MonitoringSession) -> (PeakSummary, Vec<TimeseriesPoint>) {
        let points = self.prepare_points(session);

        let close_tx_id = session.close_tx_id.as_deref();
        let close_ts = close_tx_id
            .and_then(|sig| points.iter().find(|p| p.signature == sig))
            .map(|p| p.timestamp_ms)
            .or(session.close_timestamp_ms);

        let is_competing = |p: &TimeseriesPoint| {
            p.signature != session.open_tx_id && Some(p.signature.as_str()) != close_tx_id
        };

        let (before, after): (Vec<&TimeseriesPoint>, Vec<&TimeseriesPoint>) = match close_ts {
            Some(close) => {
                let grace_end = close + self.grace_window_ms;
                (
                    points.iter().filter(|p| p.timestamp_ms < close).collect(),
                    points
                        .iter()
                        .filter(|p| p.timestamp_ms >= close && p.timestamp_ms <= grace_end)
                        .collect(),
                )
            }
            None => (points.iter().collect(), Vec::new()),
        };

        let competing_before = before.iter().filter(|p| is_competing(p)).count() as u32;
        let competing_grace = after.iter().filter(|p| is_competing(p)).count() as u32;

        let mut peak_before = peak_of(&before).map(PeakPoint::from);
        let mut peak_after = peak_of(&after).map(PeakPoint::from);

        if peak_before.is_none() && competing_before == 0 {
            peak_before = session.open_point().map(PeakPoint::from);
        }
        if close_ts.is_some() && peak_after.is_none() && competing_grace == 0 {
            peak_after = session.close_point().map(PeakPoint::from);
        }

        let summary = PeakSummary {
            peak_before_close: peak_before,
            peak_after_close: peak_after,
            competing_trades_before_close: competing_before,
            competing_trades_within_grace_window: competing_grace,
        };

        (summary, points)
    }
}

/// Highest quote price; input is chronological so strict `>` keeps the earliest tie
fn peak_of<'a>(points: &[&'a TimeseriesPoint]) -> Option<&'a TimeseriesPoint> {
    let mut best: Option<&'a TimeseriesPoint> = None;

    for point in points {
        let Some(price) = point.price_quote else {
            continue;
        };
        match best.and_then(|b| b.price_quote) {
            Some(best_price) if price <= best_price => {}
            _ => best = Some(*point),
        }
    }

    best
}
