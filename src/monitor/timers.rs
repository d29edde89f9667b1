//! Session timers (max duration and grace window)
//!
//! Each session has at most one armed timer. Arming replaces whatever was
//! armed before, so a close signal swaps the max-duration timer for the
//! grace timer. Fired timers are delivered as `TimerFired` messages and must
//! pass `accept`, which rejects anything cancelled or superseded after the
//! sleep task already sent its message.

use super::types::SessionKey;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    MaxDuration,
    Grace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub key: SessionKey,
    pub kind: TimerKind,
    generation: u64,
}

struct ArmedTimer {
    kind: TimerKind,
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct SessionTimers {
    armed: HashMap<SessionKey, ArmedTimer>,
    next_generation: u64,
    tx: mpsc::UnboundedSender<TimerFired>,
}

impl SessionTimers {
    pub fn new(tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            armed: HashMap::new(),
            next_generation: 0,
            tx,
        }
    }

    /// Arm `kind` for `key`, cancelling any timer already armed for it
    pub fn arm(&mut self, key: SessionKey, kind: TimerKind, after: Duration) {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.tx.clone();
        let fired = TimerFired {
            key: key.clone(),
            kind,
            generation,
        };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Receiver gone means the engine stopped
            let _ = tx.send(fired);
        });

        self.armed.insert(
            key,
            ArmedTimer {
                kind,
                generation,
                handle,
            },
        );
    }

    /// Cancel the timer armed for `key`, if any. Idempotent.
    pub fn cancel(&mut self, key: &SessionKey) {
        if let Some(timer) = self.armed.remove(key) {
            timer.handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.armed.drain() {
            timer.handle.abort();
        }
    }

    /// Consume a fired timer if it is still the one armed for its session
    pub fn accept(&mut self, fired: &TimerFired) -> bool {
        match self.armed.get(&fired.key) {
            Some(timer) if timer.generation == fired.generation => {
                self.armed.remove(&fired.key);
                true
            }
            _ => false,
        }
    }

    pub fn armed_kind(&self, key: &SessionKey) -> Option<TimerKind> {
        self.armed.get(key).map(|t| t.kind)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl Drop for SessionTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
