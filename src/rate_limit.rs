//! Token-bucket rate limiting (spec.md §4.6), generalized from the
//! teacher's per-IP `RateLimiter`/`TokenBucket` in `lib.rs` to a
//! per-`(UserId, action)` key so each command kind gets its own budget.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::core::user::UserId;

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    max_tokens: f64,
    refill_rate: f64,
}

impl TokenBucket {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-`(user, action)` request limiter backing every client command
/// (spec.md §4.6). `window_ms`/`max_requests` describe the bucket: it
/// refills to `max_requests` every `window_ms`.
pub struct ActionRateLimiter {
    buckets: HashMap<(UserId, &'static str), TokenBucket>,
    max_requests: u32,
    window: Duration,
}

impl ActionRateLimiter {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            buckets: HashMap::new(),
            max_requests,
            window: Duration::from_millis(window_ms),
        }
    }

    /// Returns `true` if `action` by `user` is within budget, consuming a
    /// token if so.
    pub fn check(&mut self, user: UserId, action: &'static str) -> bool {
        let refill_rate = self.max_requests as f64 / self.window.as_secs_f64();
        let bucket = self
            .buckets
            .entry((user, action))
            .or_insert_with(|| TokenBucket::new(self.max_requests as f64, refill_rate));
        bucket.try_consume()
    }

    pub fn remove_user(&mut self, user: UserId) {
        self.buckets.retain(|(id, _), _| *id != user);
    }

    /// Drops buckets untouched for longer than `idle_for`, called from the
    /// supervisor sweep so memory does not grow with churned connections.
    pub fn cleanup(&mut self, idle_for: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < idle_for);
    }
}

/// Per-IP concurrent connection cap (spec.md §4.6, §6.3 `PER_IP_CONN_CAP`).
#[derive(Default)]
pub struct ConnectionCapTracker {
    counts: HashMap<IpAddr, u32>,
}

impl ConnectionCapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to register one more connection from `ip`; returns `false`
    /// (and makes no change) if `cap` is already reached.
    pub fn try_acquire(&mut self, ip: IpAddr, cap: u32) -> bool {
        let entry = self.counts.entry(ip).or_insert(0);
        if *entry >= cap {
            return false;
        }
        *entry += 1;
        true
    }

    pub fn release(&mut self, ip: IpAddr) {
        if let Some(count) = self.counts.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.counts.remove(&ip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_limiter_blocks_after_budget_exhausted() {
        let mut limiter = ActionRateLimiter::new(60_000, 2);
        let user = UserId::new_v4();
        assert!(limiter.check(user, "skip"));
        assert!(limiter.check(user, "skip"));
        assert!(!limiter.check(user, "skip"));
    }

    #[test]
    fn action_limiter_is_independent_per_action() {
        let mut limiter = ActionRateLimiter::new(60_000, 1);
        let user = UserId::new_v4();
        assert!(limiter.check(user, "skip"));
        assert!(limiter.check(user, "chat-message"));
    }

    #[test]
    fn connection_cap_tracks_per_ip() {
        let mut tracker = ConnectionCapTracker::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(tracker.try_acquire(ip, 2));
        assert!(tracker.try_acquire(ip, 2));
        assert!(!tracker.try_acquire(ip, 2));
        tracker.release(ip);
        assert!(tracker.try_acquire(ip, 2));
    }
}
