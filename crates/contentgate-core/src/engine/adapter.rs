use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use super::{EngineBridge, EngineRequest, EngineResponse};
use crate::error::EngineError;

/// Gateway-side handle on the engine bridge.
///
/// Bounds in-flight calls with a semaphore and every call (including the
/// wait for a permit) with a timeout. It never retries; a timeout is
/// reported as [`EngineError::Timeout`].
#[derive(Clone)]
pub struct EngineAdapter {
    bridge: Arc<dyn EngineBridge>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    stats: Arc<EngineStats>,
}

#[derive(Debug, Default)]
struct EngineStats {
    calls: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    latency_micros: AtomicU64,
}

/// Point-in-time engine call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub total_latency: Duration,
}

impl EngineStatsSnapshot {
    pub fn average_latency_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_latency.as_secs_f64() * 1000.0 / self.calls as f64
        }
    }
}

impl EngineAdapter {
    pub fn new(bridge: Arc<dyn EngineBridge>, timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            bridge,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one engine call.
    #[instrument(
        name = "engine.call",
        skip(self, request),
        fields(engine = self.bridge.name(), method = %request.method, path = %request.path)
    )]
    pub async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let started = Instant::now();

        let call = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| EngineError::Closed)?;
            self.bridge.execute(request).await
        };

        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.timeout)),
        };

        let elapsed = started.elapsed();
        self.stats.calls.fetch_add(1, Ordering::Relaxed);
        self.stats
            .latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        match &result {
            Ok(response) => {
                debug!(
                    status = response.status.as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Engine call completed"
                );
            }
            Err(error) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                if error.is_timeout() {
                    self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                warn!(
                    method = %method,
                    path = %path,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %error,
                    "Engine call failed"
                );
            }
        }

        result
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            calls: self.stats.calls.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            total_latency: Duration::from_micros(self.stats.latency_micros.load(Ordering::Relaxed)),
        }
    }
}

/// Build the engine-side path for an inbound gateway path.
///
/// The gateway route `prefix` is removed and the remainder is rooted at the
/// engine `base` (empty for the document root). The query string is kept
/// verbatim.
pub fn forward_path(inbound_path: &str, prefix: &str, base: &str, query: Option<&str>) -> String {
    let rest = inbound_path.strip_prefix(prefix).unwrap_or(inbound_path);
    let rest = rest.trim_start_matches('/');
    let base = base.trim_end_matches('/');

    let mut path = if base.is_empty() {
        format!("/{rest}")
    } else if rest.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{rest}")
    };
    if !path.starts_with('/') {
        path.insert(0, '/');
    }

    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path,
    }
}
