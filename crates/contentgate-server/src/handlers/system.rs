//! Health, metrics, site configuration and content statistics.

use std::sync::atomic::Ordering;

use axum::{
    Json,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use contentgate_core::{CacheTag, EngineRequest, now_rfc3339};
use serde_json::{Value, json};

use super::content_api_path;
use crate::gateway::{CacheStatus, GatewayError, call_engine, data_items, expect_json, json_response};
use crate::metrics;
use crate::server::AppState;

pub const STATS_CACHE_KEY: &str = "stats_content";

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": now_rfc3339(),
        "version": VERSION,
    }))
}

/// `GET /metrics`: runtime counters as JSON.
pub async fn metrics_json(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine.stats();
    let cache = state.cache.stats();
    metrics::set_cache_entries(cache.count);

    Json(json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "requests": state.requests.load(Ordering::Relaxed),
        "engine": {
            "calls": engine.calls,
            "failures": engine.failures,
            "timeouts": engine.timeouts,
            "average_ms": engine.average_latency_ms(),
        },
        "cache": {
            "keys": cache.count,
            "hits": cache.hits,
            "misses": cache.misses,
            "hit_rate": cache.hit_rate(),
        },
    }))
}

/// `GET /metrics/prometheus`: text exposition when the recorder is installed.
pub async fn prometheus() -> Response {
    match metrics::render_metrics() {
        Some(body) => {
            let mut response = body.into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        None => GatewayError::NotFound("Prometheus exporter".to_string()).into_response(),
    }
}

/// `GET /config`: site metadata and feature flags for the frontend.
pub async fn site_config(State(state): State<AppState>) -> Json<Value> {
    let site = &state.config.site;
    Json(json!({
        "site": {
            "name": site.name,
            "description": site.description,
            "url": site.url,
            "api_url": site.api_url,
        },
        "api": {
            "version": VERSION,
            "endpoints": {
                "engine": "/engine-proxy/*",
                "content": "/content-proxy/*",
                "search": "/search",
                "featured": "/content/featured",
                "batch": "/content/batch",
                "preview": "/preview/{type}/{id}",
                "config": "/config",
                "stats": "/stats",
            },
        },
        "features": {
            "caching": true,
            "authentication": state.auth_gate.jwt_enabled(),
            "rate_limiting": state.config.rate_limit.enabled,
            "cors": !state.config.server.cors_origins.is_empty(),
        },
    }))
}

/// Item count of one content type as reported by the engine.
async fn count_nodes(state: &AppState, entity_type: &str) -> Result<u64, GatewayError> {
    const CONTEXT: &str = "Failed to fetch statistics";

    let request = EngineRequest::get(content_api_path(
        state,
        &format!("node/{entity_type}?page[limit]=1"),
    ))
    .structured_content();
    let response = call_engine(state, "stats", CONTEXT, request).await?;
    let document = expect_json(CONTEXT, &response)?;

    Ok(document
        .pointer("/meta/count")
        .and_then(|count| count.as_u64().or_else(|| count.as_str()?.parse().ok()))
        .unwrap_or_else(|| data_items(&document).len() as u64))
}

/// Content counts, served from cache when fresh.
async fn content_counts(state: &AppState) -> Result<(Value, CacheStatus), GatewayError> {
    if let Some(cached) = state.cache.get(STATS_CACHE_KEY)
        && let Ok(value) = serde_json::from_slice::<Value>(&cached)
    {
        metrics::record_cache_hit("stats");
        return Ok((value, CacheStatus::Hit));
    }
    metrics::record_cache_miss("stats");

    let (articles, pages) =
        tokio::try_join!(count_nodes(state, "article"), count_nodes(state, "page"))?;
    let counts = json!({
        "articles": articles,
        "pages": pages,
        "total_nodes": articles + pages,
    });

    let body = serde_json::to_vec(&counts)
        .map_err(|e| GatewayError::Internal(format!("failed to serialize stats: {e}")))?;
    state.cache.set_tagged(
        STATS_CACHE_KEY,
        body,
        state.config.cache.search_ttl(),
        vec![CacheTag::entity_type("article"), CacheTag::entity_type("page")],
    );
    Ok((counts, CacheStatus::Miss))
}

/// `GET /stats`: content counts plus live gateway figures.
pub async fn content_stats(State(state): State<AppState>) -> Result<Response, GatewayError> {
    let (content, cache_status) = content_counts(&state).await?;
    let engine = state.engine.stats();

    let payload = json!({
        "content": content,
        "api": {
            "requests": state.requests.load(Ordering::Relaxed),
            "engine_calls": engine.calls,
            "engine_failures": engine.failures,
            "average_engine_ms": engine.average_latency_ms(),
            "cache_hit_rate": state.cache.stats().hit_rate(),
        },
        "updated_at": now_rfc3339(),
    });
    let body = serde_json::to_vec(&payload)
        .map_err(|e| GatewayError::Internal(format!("failed to serialize stats: {e}")))?;
    Ok(json_response(
        StatusCode::OK,
        body,
        "application/json",
        Some(cache_status),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_payload() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], VERSION);
        assert!(body["timestamp"].is_string());
    }
}
