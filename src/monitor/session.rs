//! Per-position monitoring session
//!
//! A session moves `Open → CloseSignaled → Terminated`, or directly
//! `Open → Terminated` when the max-duration timer fires first. Nothing
//! leaves `Terminated`.

use super::types::{EventKind, SessionKey, TimeseriesPoint};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Open,
    CloseSignaled,
    Terminated,
}

/// One open position under observation
#[derive(Debug, Clone)]
pub struct MonitoringSession {
    pub key: SessionKey,
    pub pool_address: String,
    pub max_duration: Duration,
    pub open_tx_id: String,
    pub close_tx_id: Option<String>,
    /// Event time of the close signal, kept even when no close point was supplied
    pub close_timestamp_ms: Option<i64>,
    phase: SessionPhase,
    /// Anchor observation of the opening trade (not part of `data_points`)
    open_point: Option<TimeseriesPoint>,
    close_point: Option<TimeseriesPoint>,
    data_points: Vec<TimeseriesPoint>,
    /// Always a subset of the signatures in `data_points`
    seen_signatures: HashSet<String>,
}

impl MonitoringSession {
    pub fn new(
        key: SessionKey,
        pool_address: String,
        max_duration: Duration,
        open_tx_id: String,
        initial_point: Option<TimeseriesPoint>,
    ) -> Self {
        let mut session = Self {
            key,
            pool_address,
            max_duration,
            open_tx_id,
            close_tx_id: None,
            close_timestamp_ms: None,
            phase: SessionPhase::Open,
            open_point: None,
            close_point: None,
            data_points: Vec::new(),
            seen_signatures: HashSet::new(),
        };

        if let Some(point) = initial_point {
            let point = point.with_kind(EventKind::Open);
            session.open_point = Some(point.clone());
            // Normally rejected (timestamp == open timestamp); kept if it lands later
            session.record(point);
        }

        session
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == SessionPhase::Terminated
    }

    pub fn open_point(&self) -> Option<&TimeseriesPoint> {
        self.open_point.as_ref()
    }

    pub fn close_point(&self) -> Option<&TimeseriesPoint> {
        self.close_point.as_ref()
    }

    pub fn data_points(&self) -> &[TimeseriesPoint] {
        &self.data_points
    }

    pub fn has_seen(&self, signature: &str) -> bool {
        self.seen_signatures.contains(signature)
    }

    /// Append an observation
    ///
    /// Returns `false` (and drops the point) when the session is terminated,
    /// the point is at or before the open timestamp, or its signature was
    /// already recorded.
    pub fn record(&mut self, point: TimeseriesPoint) -> bool {
        if self.is_terminated() {
            return false;
        }

        self.adopt_anchor(&point);

        if point.timestamp_ms <= self.key.open_timestamp_ms {
            return false;
        }
        if self.seen_signatures.contains(&point.signature) {
            return false;
        }

        self.seen_signatures.insert(point.signature.clone());
        self.data_points.push(point);
        true
    }

    /// Streamed copies of the anchor trades fill in anchors the caller did not supply
    fn adopt_anchor(&mut self, point: &TimeseriesPoint) {
        if self.open_point.is_none() && point.signature == self.open_tx_id {
            self.open_point = Some(point.clone().with_kind(EventKind::Open));
        }
        if self.close_point.is_none() && self.close_tx_id.as_deref() == Some(point.signature.as_str()) {
            self.close_point = Some(point.clone().with_kind(EventKind::Close));
        }
    }

    /// Mark the close signal. Only valid from `Open`.
    pub fn request_close(
        &mut self,
        close_tx_id: String,
        close_timestamp_ms: i64,
        close_point: Option<TimeseriesPoint>,
    ) -> bool {
        if self.phase != SessionPhase::Open {
            return false;
        }

        self.phase = SessionPhase::CloseSignaled;
        self.close_tx_id = Some(close_tx_id);
        self.close_timestamp_ms = Some(close_timestamp_ms);

        if let Some(point) = close_point {
            let point = point.with_kind(EventKind::Close);
            self.close_point = Some(point.clone());
            self.record(point);
        } else if let Some(seen) = self
            .data_points
            .iter()
            .find(|p| Some(p.signature.as_str()) == self.close_tx_id.as_deref())
        {
            self.close_point = Some(seen.clone().with_kind(EventKind::Close));
        }

        true
    }

    /// Enter the terminal state. Idempotent.
    pub fn terminate(&mut self) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.phase = SessionPhase::Terminated;
        true
    }
}
