//! Sliding-window admission control keyed by requester identity.
//!
//! Every check prunes timestamps that fell out of the window and then records
//! the current request, throttled or not, so a user who keeps retrying keeps
//! pushing their window forward.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_THROTTLE_MESSAGE: &str =
    "Take a few moments to breathe and think. I'll be right here when you're ready.";

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Trailing window length in milliseconds.
    pub window_ms: u64,
    /// Requests already inside the window at which new ones are throttled.
    pub max_requests: usize,
    /// How often idle identities are evicted.
    pub sweep_interval_secs: u64,
    /// Message returned to throttled callers.
    pub throttle_message: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 120_000,
            max_requests: 5,
            sweep_interval_secs: 60,
            throttle_message: DEFAULT_THROTTLE_MESSAGE.to_string(),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Throttled,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Per-identity request timestamps within a trailing window.
#[derive(Debug)]
pub struct RateLimiter {
    window_ms: u64,
    max_requests: usize,
    requests: DashMap<String, Vec<u64>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window_ms: config.window_ms,
            max_requests: config.max_requests,
            requests: DashMap::new(),
        }
    }

    /// Decide whether a request from `identity` at `now_ms` is admitted.
    ///
    /// The map entry stays locked across prune, count and append, so two
    /// concurrent requests from one identity never both slip under the limit.
    pub fn check_admission(&self, identity: &str, now_ms: u64) -> Admission {
        let window_ms = self.window_ms;
        let mut timestamps = self.requests.entry(identity.to_string()).or_default();

        timestamps.retain(|&ts| now_ms.saturating_sub(ts) < window_ms);
        let recent = timestamps.len();
        timestamps.push(now_ms);

        if recent >= self.max_requests {
            Admission::Throttled
        } else {
            Admission::Admitted
        }
    }

    /// [`check_admission`](Self::check_admission) against the wall clock.
    pub fn check(&self, identity: &str) -> Admission {
        self.check_admission(identity, now_millis())
    }

    /// Drop identities with no timestamps left inside the window.
    /// Returns the number of evicted identities.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let window_ms = self.window_ms;
        let before = self.requests.len();
        self.requests.retain(|_, timestamps| {
            timestamps.retain(|&ts| now_ms.saturating_sub(ts) < window_ms);
            !timestamps.is_empty()
        });
        before.saturating_sub(self.requests.len())
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.requests.len()
    }
}

/// Periodically evict idle identities until the task is aborted.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = limiter.sweep(now_millis());
            if evicted > 0 {
                debug!(
                    evicted,
                    tracked = limiter.tracked_identities(),
                    "Evicted idle rate-limit identities"
                );
            }
        }
    })
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
