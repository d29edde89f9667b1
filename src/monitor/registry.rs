//! Live session registry
//!
//! Owns every live `MonitoringSession` plus a token → sessions index. The
//! set of monitored tokens is exactly the key set of that index, so a token
//! is monitored iff at least one live session references it.

use super::session::{MonitoringSession, SessionPhase};
use super::types::{SessionKey, TimeseriesPoint};
use std::collections::{HashMap, HashSet};

/// Result of a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Created(SessionKey),
    /// Duplicate start for a live key; the existing session is left untouched
    Existing(SessionKey),
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionKey, MonitoringSession>,
    token_index: HashMap<String, HashSet<SessionKey>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_session(&mut self, session: MonitoringSession) -> StartOutcome {
        let key = session.key.clone();

        if self.sessions.contains_key(&key) {
            return StartOutcome::Existing(key);
        }

        self.token_index
            .entry(key.token.clone())
            .or_default()
            .insert(key.clone());
        self.sessions.insert(key.clone(), session);

        StartOutcome::Created(key)
    }

    /// Find the most recent `Open` session for wallet+token
    pub fn find_open(&self, wallet: &str, token: &str) -> Option<SessionKey> {
        self.token_index
            .get(token)?
            .iter()
            .filter(|key| key.wallet == wallet)
            .filter(|key| {
                self.sessions
                    .get(*key)
                    .map(|s| s.phase() == SessionPhase::Open)
                    .unwrap_or(false)
            })
            .max_by_key(|key| key.open_timestamp_ms)
            .cloned()
    }

    /// Move the most recent open session for wallet+token to `CloseSignaled`
    ///
    /// Returns the affected key, or `None` when nothing open matches.
    pub fn signal_close(
        &mut self,
        wallet: &str,
        token: &str,
        close_tx_id: String,
        close_timestamp_ms: i64,
        close_point: Option<TimeseriesPoint>,
    ) -> Option<SessionKey> {
        let key = self.find_open(wallet, token)?;
        let session = self.sessions.get_mut(&key)?;

        if session.request_close(close_tx_id, close_timestamp_ms, close_point) {
            Some(key)
        } else {
            None
        }
    }

    /// Offer a point to every live session on `token`
    ///
    /// Returns how many sessions accepted it.
    pub fn record_point(&mut self, token: &str, point: &TimeseriesPoint) -> usize {
        let Some(keys) = self.token_index.get(token) else {
            return 0;
        };

        let mut accepted = 0;
        for key in keys {
            if let Some(session) = self.sessions.get_mut(key) {
                if session.record(point.clone()) {
                    accepted += 1;
                }
            }
        }
        accepted
    }

    /// Remove a session, dropping its token from the monitored set if it was the last one
    pub fn remove_session(&mut self, key: &SessionKey) -> Option<MonitoringSession> {
        let session = self.sessions.remove(key)?;

        if let Some(keys) = self.token_index.get_mut(&key.token) {
            keys.remove(key);
            if keys.is_empty() {
                self.token_index.remove(&key.token);
            }
        }

        Some(session)
    }

    pub fn get(&self, key: &SessionKey) -> Option<&MonitoringSession> {
        self.sessions.get(key)
    }

    /// True if any live session exists for wallet+token
    pub fn is_monitoring(&self, wallet: &str, token: &str) -> bool {
        self.token_index
            .get(token)
            .map(|keys| keys.iter().any(|k| k.wallet == wallet))
            .unwrap_or(false)
    }

    pub fn is_token_monitored(&self, token: &str) -> bool {
        self.token_index.contains_key(token)
    }

    /// Token of any live session trading through `pool`
    pub fn token_for_pool(&self, pool: &str) -> Option<String> {
        self.sessions
            .values()
            .find(|s| s.pool_address == pool)
            .map(|s| s.key.token.clone())
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.token_index.len()
    }
}
