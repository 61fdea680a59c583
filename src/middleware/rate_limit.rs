use std::{
    collections::VecDeque,
    sync::RwLock,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Policy {
    enabled: bool,
    max_requests: u32,
    window: Duration,
}

impl From<&RateLimitConfig> for Policy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
        }
    }
}

/// Outcome of §4.1's `check` operation.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub used: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

/// Sliding-window bucket: an ordered queue of request instants within the
/// configured window. Each client key gets its own `dashmap` shard, so
/// distinct keys never contend on the same lock.
struct Bucket {
    timestamps: VecDeque<Instant>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    fn evict_before(&mut self, cutoff: Instant) {
        while let Some(front) = self.timestamps.front() {
            if *front <= cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

pub struct RateLimiter {
    policy: RwLock<Policy>,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            policy: RwLock::new(Policy::from(config)),
            buckets: DashMap::new(),
        }
    }

    pub fn update_config(&self, config: &RateLimitConfig) {
        *self.policy.write().expect("rate limit policy lock poisoned") = Policy::from(config);
    }

    /// Implements the sliding-window algorithm in §4.1.
    pub fn check(&self, client_key: &str) -> RateLimitOutcome {
        let policy = *self.policy.read().expect("rate limit policy lock poisoned");

        if !policy.enabled {
            return RateLimitOutcome {
                allowed: true,
                used: 0,
                remaining: 0,
                reset_secs: 0,
            };
        }

        let now = Instant::now();
        let cutoff = now.checked_sub(policy.window).unwrap_or(now);

        let mut bucket = self
            .buckets
            .entry(client_key.to_string())
            .or_insert_with(Bucket::new);
        bucket.evict_before(cutoff);

        let len = bucket.timestamps.len() as u32;
        if len >= policy.max_requests {
            let oldest = *bucket.timestamps.front().expect("bucket is at capacity");
            let reset = oldest + policy.window;
            let reset_secs = reset.saturating_duration_since(now).as_secs();
            return RateLimitOutcome {
                allowed: false,
                used: len,
                remaining: 0,
                reset_secs,
            };
        }

        bucket.timestamps.push_back(now);
        let new_len = bucket.timestamps.len() as u32;
        RateLimitOutcome {
            allowed: true,
            used: new_len,
            remaining: policy.max_requests - new_len,
            reset_secs: policy.window.as_secs(),
        }
    }

    pub fn current_limit(&self) -> u32 {
        self.policy.read().expect("rate limit policy lock poisoned").max_requests
    }

    pub fn clear_client(&self, client_key: &str) {
        self.buckets.remove(client_key);
    }

    pub fn clear_all(&self) {
        self.buckets.clear();
    }

    /// Snapshot of `{client_key -> current_count}`, evaluated against the
    /// current window without mutating any bucket.
    pub fn stats(&self) -> std::collections::HashMap<String, u32> {
        let policy = *self.policy.read().expect("rate limit policy lock poisoned");
        let now = Instant::now();
        let cutoff = now.checked_sub(policy.window).unwrap_or(now);
        self.buckets
            .iter()
            .map(|entry| {
                let count = entry
                    .value()
                    .timestamps
                    .iter()
                    .filter(|ts| **ts > cutoff)
                    .count() as u32;
                (entry.key().clone(), count)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_requests: u32, window_secs: u64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            max_requests,
            window_secs,
        }
    }

    #[test]
    fn boundary_scenario_allows_max_then_rejects() {
        let limiter = RateLimiter::new(&config(3, 60));
        let first = limiter.check("1.2.3.4");
        let second = limiter.check("1.2.3.4");
        let third = limiter.check("1.2.3.4");
        let fourth = limiter.check("1.2.3.4");

        assert!(first.allowed && first.remaining == 2);
        assert!(second.allowed && second.remaining == 1);
        assert!(third.allowed && third.remaining == 0);
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert!(fourth.reset_secs <= 60);
    }

    #[test]
    fn distinct_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(&config(1, 60));
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(!limiter.check("a").allowed);
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let mut cfg = config(1, 60);
        cfg.enabled = false;
        let limiter = RateLimiter::new(&cfg);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("a").allowed);
    }

    #[test]
    fn clear_client_resets_bucket() {
        let limiter = RateLimiter::new(&config(1, 60));
        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
        limiter.clear_client("a");
        assert!(limiter.check("a").allowed);
    }

    #[test]
    fn clear_all_resets_every_bucket() {
        let limiter = RateLimiter::new(&config(1, 60));
        limiter.check("a");
        limiter.check("b");
        limiter.clear_all();
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }

    #[test]
    fn stats_reports_current_counts() {
        let limiter = RateLimiter::new(&config(5, 60));
        limiter.check("a");
        limiter.check("a");
        limiter.check("b");
        let stats = limiter.stats();
        assert_eq!(stats.get("a"), Some(&2));
        assert_eq!(stats.get("b"), Some(&1));
    }
}
