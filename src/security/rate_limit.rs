//! Sliding-window admission control keyed by peer identity.
//!
//! Admission and recording are separate calls: a caller can check, reject
//! without recording, or record only after the rest of its checks pass.
//! [`RateLimiter::admit_and_record`] does both under one entry lock for
//! callers that already know whether to record.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Timestamps of recent admissions for one identity.
#[derive(Debug)]
struct RateLimitState {
    requests: VecDeque<Instant>,
}

impl RateLimitState {
    fn new() -> Self {
        Self {
            requests: VecDeque::new(),
        }
    }

    /// Drop timestamps that have left the window.
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.requests.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-identity sliding-window rate limiter.
///
/// Each key owns its own entry in a sharded map, so sessions for different
/// identities never contend on the same lock.
#[derive(Debug)]
pub struct RateLimiter {
    states: DashMap<String, RateLimitState>,
    window: Duration,
    max_requests: usize,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            states: DashMap::new(),
            window,
            max_requests,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.window(), config.max_requests)
    }

    /// Window length; also the retry-after hint for rejected peers.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// True iff fewer than `max_requests` admissions remain in the window.
    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// Record an admission for `key` now.
    pub fn record(&self, key: &str) {
        self.record_at(key, Instant::now());
    }

    pub fn admit_at(&self, key: &str, now: Instant) -> bool {
        match self.states.get_mut(key) {
            Some(mut state) => {
                state.prune(now, self.window);
                state.requests.len() < self.max_requests
            }
            None => self.max_requests > 0,
        }
    }

    pub fn record_at(&self, key: &str, now: Instant) {
        let mut state = self
            .states
            .entry(key.to_string())
            .or_insert_with(RateLimitState::new);
        state.prune(now, self.window);
        state.requests.push_back(now);
    }

    /// Check and, when `record` is set and the key is admitted, record in one
    /// step. The key's entry stays locked throughout, so a burst from one
    /// identity cannot overshoot `max_requests`.
    pub fn admit_and_record(&self, key: &str, record: bool) -> bool {
        self.admit_and_record_at(key, Instant::now(), record)
    }

    pub fn admit_and_record_at(&self, key: &str, now: Instant, record: bool) -> bool {
        if !record {
            return self.admit_at(key, now);
        }
        let mut state = self
            .states
            .entry(key.to_string())
            .or_insert_with(RateLimitState::new);
        state.prune(now, self.window);
        if state.requests.len() >= self.max_requests {
            return false;
        }
        state.requests.push_back(now);
        true
    }

    /// Remove identities with no admissions left in the window.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.states.len();
        self.states.retain(|_, state| {
            state.prune(now, self.window);
            !state.requests.is_empty()
        });
        before - self.states.len()
    }

    /// Number of identities currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }
}

/// Derive the limiter key from the peer address and its declared client.
pub fn client_key(ip: IpAddr, headers: &HeaderMap) -> String {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    format!("{}|{}", ip, agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_admits_up_to_max_within_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        let start = Instant::now();

        for i in 0..3 {
            let now = start + Duration::from_secs(i);
            assert!(limiter.admit_at("peer", now), "call {} should be admitted", i);
            limiter.record_at("peer", now);
        }
        assert!(!limiter.admit_at("peer", start + Duration::from_secs(10)));
    }

    #[test]
    fn test_readmits_after_window_from_oldest() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 2);
        let start = Instant::now();
        limiter.record_at("peer", start);
        limiter.record_at("peer", start + Duration::from_secs(30));

        assert!(!limiter.admit_at("peer", start + Duration::from_secs(59)));
        // Oldest falls out exactly one window later.
        assert!(limiter.admit_at("peer", start + Duration::from_secs(60)));
    }

    #[test]
    fn test_admit_without_record_does_not_count() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        for _ in 0..5 {
            assert!(limiter.admit("peer"));
        }
        assert_eq!(limiter.tracked_keys(), 0);
        limiter.record("peer");
        assert!(!limiter.admit("peer"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        limiter.record("a");
        assert!(!limiter.admit("a"));
        assert!(limiter.admit("b"));
    }

    #[test]
    fn test_sweep_drops_idle_keys() {
        let limiter = RateLimiter::new(Duration::from_millis(1), 1);
        limiter.record_at("old", Instant::now() - Duration::from_secs(1));
        limiter.record_at("fresh", Instant::now() + Duration::from_secs(10));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_concurrent_records() {
        let limiter = std::sync::Arc::new(RateLimiter::new(Duration::from_secs(60), 200));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        limiter.record(&format!("key-{}", t % 2));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // 4 threads x 50 records per key: every record landed.
        assert_eq!(limiter.tracked_keys(), 2);
        assert!(!limiter.admit("key-0"));
        assert!(!limiter.admit("key-1"));
    }

    #[test]
    fn test_admit_and_record_burst_stays_within_limit() {
        let limiter = std::sync::Arc::new(RateLimiter::new(Duration::from_secs(60), 5));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| limiter.admit_and_record("burst", true))
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn test_admit_and_record_without_record_leaves_no_trace() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.admit_and_record("peer", false));
        assert!(limiter.admit_and_record("peer", false));
        assert_eq!(limiter.tracked_keys(), 0);

        assert!(limiter.admit_and_record("peer", true));
        assert!(!limiter.admit_and_record("peer", true));
        assert!(!limiter.admit_and_record("peer", false));
    }

    #[test]
    fn test_client_key() {
        let mut headers = HeaderMap::new();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(client_key(ip, &headers), "10.0.0.1|unknown");

        headers.insert(header::USER_AGENT, HeaderValue::from_static("peer/1.0"));
        assert_eq!(client_key(ip, &headers), "10.0.0.1|peer/1.0");
    }
}
