//! Prometheus metrics for the gateway.
//!
//! This module provides:
//! - HTTP request metrics (count, latency)
//! - Response cache metrics (hits, misses, entries, invalidations)
//! - Engine call metrics (count, latency, failures)
//! - Rate limiter rejections

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";

    // Engine metrics
    pub const ENGINE_CALLS_TOTAL: &str = "engine_calls_total";
    pub const ENGINE_CALL_DURATION_SECONDS: &str = "engine_call_duration_seconds";

    // Rate limiting
    pub const RATE_LIMITED_TOTAL: &str = "rate_limited_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// This should be called once at server startup.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics/prometheus renders the handle itself
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP Metrics
// =============================================================================

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };

    // Normalize path to avoid high cardinality
    let normalized_path = normalize_path(path);

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => normalized_path.clone(),
        "status" => status.to_string(),
        "status_class" => status_class.to_string()
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => normalized_path
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit for a handler family (`engine-proxy`, `search`, ...).
pub fn record_cache_hit(scope: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "scope" => scope).increment(1);
}

/// Record a cache miss for a handler family.
pub fn record_cache_miss(scope: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "scope" => scope).increment(1);
}

/// Set the number of live cache entries.
pub fn set_cache_entries(count: usize) {
    gauge!(names::CACHE_ENTRIES).set(count as f64);
}

/// Record entries removed by a webhook, a flush or the expiry sweep.
pub fn record_cache_invalidation(reason: &'static str, removed: usize) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL, "reason" => reason).increment(removed as u64);
}

// =============================================================================
// Engine Metrics
// =============================================================================

/// Record one engine call made on behalf of `operation`.
pub fn record_engine_call(operation: &'static str, outcome: &'static str, duration: Duration) {
    counter!(
        names::ENGINE_CALLS_TOTAL,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);

    histogram!(names::ENGINE_CALL_DURATION_SECONDS, "operation" => operation)
        .record(duration.as_secs_f64());
}

// =============================================================================
// Rate Limiting
// =============================================================================

pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

// =============================================================================
// Helpers
// =============================================================================

/// Normalize a path to reduce cardinality.
///
/// Replaces entity IDs with placeholders to avoid creating too many unique label values.
pub(crate) fn normalize_path(path: &str) -> String {
    // /preview/article/42 -> /preview/article/{id}
    // /content-proxy/node/article/6f1c...-uuid -> /content-proxy/node/article/{id}
    // /engine-proxy/node/7/edit -> /engine-proxy/node/{id}/edit
    path.split('/')
        .map(|part| if is_likely_id(part) { "{id}" } else { part })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a string looks like an ID (UUID or numeric).
fn is_likely_id(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }

    // UUID pattern (with or without dashes)
    if s.len() == 36 && s.chars().filter(|c| *c == '-').count() == 4 {
        return true;
    }
    if s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit()) {
        return true;
    }

    // Numeric ID
    if s.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    // Long alphanumeric (likely an ID)
    s.len() > 24 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/preview/article/12345"), "/preview/article/{id}");
        assert_eq!(
            normalize_path("/content-proxy/node/article/550e8400-e29b-41d4-a716-446655440000"),
            "/content-proxy/node/article/{id}"
        );
        assert_eq!(
            normalize_path("/engine-proxy/node/7/edit"),
            "/engine-proxy/node/{id}/edit"
        );
        assert_eq!(normalize_path("/content/featured"), "/content/featured");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_is_likely_id() {
        assert!(is_likely_id("12345"));
        assert!(is_likely_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_likely_id("article"));
        assert!(!is_likely_id("cache-invalidate"));
        assert!(!is_likely_id(""));
    }
}
