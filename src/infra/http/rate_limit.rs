use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Fixed-window request limiter keyed by client identity.
#[derive(Debug)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: DashMap<String, Window>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: DashMap::new(),
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut entry = self.buckets.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            return false;
        }

        entry.count += 1;
        true
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_window_budget_is_spent() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 3);
        let start = Instant::now();
        assert!(limiter.allow_at("1.2.3.4", start));
        assert!(limiter.allow_at("1.2.3.4", start));
        assert!(limiter.allow_at("1.2.3.4", start));
        assert!(!limiter.allow_at("1.2.3.4", start));
        // a different client has its own budget
        assert!(limiter.allow_at("5.6.7.8", start));
    }

    #[test]
    fn budget_resets_when_the_window_rolls_over() {
        let limiter = ApiRateLimiter::new(Duration::from_secs(60), 1);
        let start = Instant::now();
        assert!(limiter.allow_at("1.2.3.4", start));
        assert!(!limiter.allow_at("1.2.3.4", start));
        assert!(limiter.allow_at("1.2.3.4", start + Duration::from_secs(61)));
    }
}
