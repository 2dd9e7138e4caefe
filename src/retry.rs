//! Reconnect scheduling and timeout utilities.
//!
//! The realtime channel retries with a fixed delay and a bounded attempt
//! budget. Nothing here touches the transport, so the policy can be tested on
//! its own.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Fixed-delay policy controlling automatic reconnect attempts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconnectPolicy {
    /// Maximum number of consecutive automatic attempts before the client
    /// gives up and waits for an explicit `connect`.
    pub max_attempts: u32,
    /// Delay applied before every automatic attempt.
    pub delay: Duration,
}

impl ReconnectPolicy {
    /// Default attempt budget.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    /// Default delay between attempts.
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(3000);

    /// Builds a fixed-delay policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Policy that never reconnects automatically.
    pub fn disabled() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Returns the wait before the next automatic attempt.
    ///
    /// `attempts` is the number of automatic attempts already scheduled since
    /// the last successful open. `None` means the budget is spent.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if attempts >= self.max_attempts {
            debug!(
                event = "reconnect_budget_exhausted",
                attempts,
                max_attempts = self.max_attempts
            );
            return None;
        }
        Some(self.delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}

/// Applies a timeout to an async computation.
pub async fn with_timeout<T, Fut>(
    timeout: Duration,
    future: Fut,
) -> Result<T, tokio::time::error::Elapsed>
where
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, future).await
}
