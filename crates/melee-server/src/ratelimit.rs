// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-IP token-bucket rate limiting over a sharded concurrent map.
//!
//! 10 requests/second sustained, burst 20, per client address. A
//! sweeper task evicts buckets idle for five minutes so one-shot
//! crawlers do not pin memory. Rejections surface as 429 with
//! `Retry-After: 1` at the HTTP layer.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

/// Sustained requests per second per IP.
pub const RATE_PER_SEC: f64 = 10.0;
/// Burst size per IP.
pub const BURST: f64 = 20.0;
/// Idle duration after which a bucket is evicted.
pub const IDLE_EVICTION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled: Instant,
    touched: Instant,
}

/// Sharded per-IP token buckets.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<IpAddr, Bucket>,
    rate: f64,
    burst: f64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RATE_PER_SEC, BURST)
    }
}

impl RateLimiter {
    /// Creates a limiter with the given sustained rate and burst.
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            rate,
            burst,
        }
    }

    /// Takes one token for `ip`; `false` means reject.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(ip).or_insert_with(|| Bucket {
            tokens: self.burst,
            refilled: now,
            touched: now,
        });
        let elapsed = now.duration_since(bucket.refilled).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.refilled = now;
        bucket.touched = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Evicts buckets idle longer than `idle`.
    pub fn sweep(&self, idle: Duration) {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.duration_since(b.touched) < idle);
        let evicted = before - self.buckets.len();
        if evicted > 0 {
            debug!(evicted, "rate limiter swept idle buckets");
        }
    }

    /// Tracked addresses (for stats).
    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }

    /// Spawns the periodic sweeper.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                limiter.sweep(IDLE_EVICTION);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn burst_then_reject() {
        let limiter = RateLimiter::new(10.0, 20.0);
        let mut allowed = 0;
        for _ in 0..40 {
            if limiter.check(ip(1)) {
                allowed += 1;
            }
        }
        // instantaneous: exactly the burst gets through
        assert_eq!(allowed, 20);
    }

    #[test]
    fn addresses_are_independent() {
        let limiter = RateLimiter::new(10.0, 2.0);
        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        assert!(limiter.check(ip(2)));
    }

    #[test]
    fn tokens_refill_over_time() {
        let limiter = RateLimiter::new(1000.0, 2.0);
        assert!(limiter.check(ip(3)));
        assert!(limiter.check(ip(3)));
        assert!(!limiter.check(ip(3)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(limiter.check(ip(3)));
    }

    #[test]
    fn sweep_evicts_idle_buckets() {
        let limiter = RateLimiter::new(10.0, 20.0);
        limiter.check(ip(4));
        assert_eq!(limiter.tracked(), 1);
        limiter.sweep(Duration::from_secs(300));
        assert_eq!(limiter.tracked(), 1, "fresh bucket survives");
        limiter.sweep(Duration::ZERO);
        assert_eq!(limiter.tracked(), 0, "idle bucket evicted");
    }
}
