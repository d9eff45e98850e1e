//! Fixed-window request limiter keyed by client identity.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use dashmap::DashMap;

use crate::config::RateLimitConfig;

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_secs: u64,
    },
    Limited {
        limit: u32,
        retry_after_secs: u64,
    },
    /// Bookkeeping failed; the request is admitted without accounting.
    Untracked,
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, ClientWindow>,
    max_requests: u32,
    window: Duration,
    max_tracked_clients: usize,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, max_tracked_clients: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            max_tracked_clients: max_tracked_clients.max(1),
        }
    }

    pub fn from_config(cfg: &RateLimitConfig) -> Self {
        Self::new(cfg.max_requests, cfg.window(), cfg.max_tracked_clients)
    }

    /// Count one request for `client` and decide whether it may proceed.
    pub fn check(&self, client: &str) -> RateDecision {
        if !self.windows.contains_key(client) && self.windows.len() >= self.max_tracked_clients {
            let swept = self.sweep();
            if self.windows.len() >= self.max_tracked_clients {
                tracing::warn!(
                    tracked = self.windows.len(),
                    swept,
                    "Rate limiter client table full, admitting request untracked"
                );
                return RateDecision::Untracked;
            }
        }

        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(client.to_string())
            .or_insert(ClientWindow {
                started: now,
                count: 0,
            });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);

        let reset_secs = ceil_secs(self.window.saturating_sub(now.duration_since(entry.started)));
        if entry.count > self.max_requests {
            RateDecision::Limited {
                limit: self.max_requests,
                retry_after_secs: reset_secs.max(1),
            }
        } else {
            RateDecision::Allowed {
                limit: self.max_requests,
                remaining: self.max_requests - entry.count,
                reset_secs,
            }
        }
    }

    /// Drop windows that have fully elapsed. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let before = self.windows.len();
        let window = self.window;
        self.windows.retain(|_, w| w.started.elapsed() < window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Client identity: the first `X-Forwarded-For` hop when trusted, otherwise
/// the peer address.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for
        && let Some(first_hop) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
    {
        return first_hop.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_limit_per_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60), 100);
        assert!(matches!(
            limiter.check("10.0.0.1"),
            RateDecision::Allowed { remaining: 1, .. }
        ));
        assert!(matches!(
            limiter.check("10.0.0.1"),
            RateDecision::Allowed { remaining: 0, .. }
        ));
        match limiter.check("10.0.0.1") {
            RateDecision::Limited {
                limit,
                retry_after_secs,
            } => {
                assert_eq!(limit, 2);
                assert!((1..=60).contains(&retry_after_secs));
            }
            other => panic!("expected limited, got {other:?}"),
        }

        // Other clients have their own window
        assert!(matches!(
            limiter.check("10.0.0.2"),
            RateDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_millis(30), 100);
        assert!(matches!(limiter.check("c"), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check("c"), RateDecision::Limited { .. }));
        std::thread::sleep(Duration::from_millis(50));
        assert!(matches!(limiter.check("c"), RateDecision::Allowed { .. }));
    }

    #[test]
    fn test_full_table_fails_open() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), 1);
        assert!(matches!(limiter.check("a"), RateDecision::Allowed { .. }));
        assert_eq!(limiter.check("b"), RateDecision::Untracked);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_sweep_frees_capacity() {
        let limiter = RateLimiter::new(5, Duration::from_millis(20), 1);
        limiter.check("a");
        std::thread::sleep(Duration::from_millis(40));
        assert!(matches!(limiter.check("b"), RateDecision::Allowed { .. }));
    }

    #[test]
    fn test_client_identity() {
        let peer: SocketAddr = "192.0.2.7:5123".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );

        assert_eq!(client_identity(&headers, Some(peer), false), "192.0.2.7");
        assert_eq!(client_identity(&headers, Some(peer), true), "203.0.113.9");
        assert_eq!(client_identity(&HeaderMap::new(), None, true), "unknown");
    }
}
