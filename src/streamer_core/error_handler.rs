use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Fixed-delay reconnect schedule. Never gives up.
#[derive(Debug)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempts: u64,
}

impl ReconnectPolicy {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            attempts: 0,
        }
    }

    pub async fn wait(&mut self) {
        self.attempts += 1;

        log::warn!(
            "⏳ Reconnect attempt {} in {}ms",
            self.attempts,
            self.delay.as_millis()
        );

        sleep(self.delay).await;
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_and_reset() {
        let mut policy = ReconnectPolicy::new(2_000);
        let start = tokio::time::Instant::now();

        policy.wait().await;
        policy.wait().await;

        assert_eq!(policy.attempts(), 2);
        assert!(start.elapsed() >= Duration::from_millis(4_000));

        policy.reset();
        assert_eq!(policy.attempts(), 0);
    }
}
