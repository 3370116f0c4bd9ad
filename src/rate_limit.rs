use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::debug;

/// Fixed-window quota: at most `limit` requests per `window` per identifier.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitQuota {
    pub limit: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Instant,
}

impl RateLimitDecision {
    pub fn retry_after_secs(&self, now: Instant) -> u64 {
        self.reset_at.saturating_duration_since(now).as_secs().max(1)
    }
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Process-local, in-memory rate limiter. State lives only in this struct:
/// it is constructed once at startup, shared through `AppState`, and lost on
/// restart. Not shared across instances.
#[derive(Debug)]
pub struct RateLimiter {
    quota: RateLimitQuota,
    entries: Mutex<HashMap<String, WindowEntry>>,
}

impl RateLimiter {
    pub fn new(quota: RateLimitQuota) -> Self {
        Self {
            quota,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn quota(&self) -> RateLimitQuota {
        self.quota
    }

    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Instant::now())
    }

    fn check_at(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let quota = self.quota;
        let entry = entries
            .entry(identifier.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now + quota.window,
            });

        // An expired window is replaced, never extended.
        if entry.reset_at <= now {
            entry.count = 0;
            entry.reset_at = now + quota.window;
        }

        if entry.count >= quota.limit {
            return RateLimitDecision {
                allowed: false,
                limit: quota.limit,
                remaining: 0,
                reset_at: entry.reset_at,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            limit: quota.limit,
            remaining: quota.limit - entry.count,
            reset_at: entry.reset_at,
        }
    }

    /// Drop entries whose window has passed. Housekeeping only: `check_at`
    /// resets stale windows on its own, this just bounds memory growth.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at > now);
        before - entries.len()
    }

    /// Run the sweep as an owned background task. The returned guard aborts
    /// the task when dropped, tying its lifetime to whoever holds it.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperGuard {
        let limiter = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.sweep_expired();
                if removed > 0 {
                    debug!(removed, "swept expired rate limit windows");
                }
            }
        });
        SweeperGuard { handle }
    }
}

pub struct SweeperGuard {
    handle: JoinHandle<()>,
}

impl Drop for SweeperGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitQuota {
            limit,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn remaining_decreases_then_limit_is_enforced() {
        let limiter = limiter(3, 60);
        let now = Instant::now();

        let mut last_remaining = u32::MAX;
        let mut first_reset = None;
        for _ in 0..3 {
            let decision = limiter.check_at("1.2.3.4", now);
            assert!(decision.allowed);
            assert!(decision.remaining < last_remaining);
            last_remaining = decision.remaining;
            first_reset.get_or_insert(decision.reset_at);
        }
        assert_eq!(last_remaining, 0);

        let denied = limiter.check_at("1.2.3.4", now);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        // Denial does not extend the window.
        assert_eq!(Some(denied.reset_at), first_reset);
    }

    #[test]
    fn identifiers_have_independent_windows() {
        let limiter = limiter(1, 60);
        let now = Instant::now();

        assert!(limiter.check_at("a", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
    }

    #[test]
    fn expired_window_grants_a_fresh_count() {
        let limiter = limiter(2, 10);
        let now = Instant::now();

        assert!(limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("a", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);

        let later = now + Duration::from_secs(11);
        let fresh = limiter.check_at("a", later);
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
        assert!(fresh.reset_at > later);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let limiter = limiter(5, 10);
        let now = Instant::now();

        limiter.check_at("stale", now);
        limiter.check_at("live", now + Duration::from_secs(8));

        let removed = limiter.sweep_expired_at(now + Duration::from_secs(11));
        assert_eq!(removed, 1);

        // The surviving entry keeps its count.
        let decision = limiter.check_at("live", now + Duration::from_secs(12));
        assert_eq!(decision.remaining, 3);
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        limiter.check_at("a", now);
        let denied = limiter.check_at("a", now);
        assert!(denied.retry_after_secs(now) >= 1);
        assert!(denied.retry_after_secs(now) <= 60);
    }
}
