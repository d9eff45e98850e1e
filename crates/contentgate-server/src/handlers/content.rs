//! Content endpoints composed from one or more engine calls.

use axum::{
    Extension,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use contentgate_auth::AuthContext;
use contentgate_core::{CacheTag, EngineRequest, Payload, STRUCTURED_CONTENT_TYPE, now_rfc3339};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument};

use super::{content_api_path, is_machine_name, is_path_safe_id, parse_json_body, scalar_id};
use crate::gateway::{CacheStatus, GatewayError, call_engine, data_items, expect_json, json_response};
use crate::metrics;
use crate::server::AppState;

pub const FEATURED_CACHE_KEY: &str = "featured_content";

const FEATURED_ARTICLE_LIMIT: u32 = 5;
const FEATURED_PAGE_LIMIT: u32 = 3;

const X_PREVIEW_MODE: HeaderName = HeaderName::from_static("x-preview-mode");

fn to_body(value: &Value) -> Result<Vec<u8>, GatewayError> {
    serde_json::to_vec(value)
        .map_err(|e| GatewayError::Internal(format!("failed to serialize response: {e}")))
}

fn promoted_listing(state: &AppState, entity_type: &str, limit: u32) -> EngineRequest {
    EngineRequest::get(content_api_path(
        state,
        &format!("node/{entity_type}?filter[promote]=1&sort=-created&page[limit]={limit}"),
    ))
    .structured_content()
}

// =============================================================================
// Featured
// =============================================================================

/// `GET /content/featured`: promoted articles and pages, newest first.
#[instrument(skip(state))]
pub async fn featured(State(state): State<AppState>) -> Result<Response, GatewayError> {
    const CONTEXT: &str = "Failed to fetch featured content";

    if let Some(cached) = state.cache.get(FEATURED_CACHE_KEY) {
        metrics::record_cache_hit("featured");
        return Ok(json_response(
            StatusCode::OK,
            cached.to_vec(),
            "application/json",
            Some(CacheStatus::Hit),
        ));
    }
    metrics::record_cache_miss("featured");

    let (articles, pages) = tokio::try_join!(
        call_engine(
            &state,
            "featured",
            CONTEXT,
            promoted_listing(&state, "article", FEATURED_ARTICLE_LIMIT),
        ),
        call_engine(
            &state,
            "featured",
            CONTEXT,
            promoted_listing(&state, "page", FEATURED_PAGE_LIMIT),
        ),
    )?;
    let articles = data_items(&expect_json(CONTEXT, &articles)?);
    let pages = data_items(&expect_json(CONTEXT, &pages)?);

    let payload = json!({
        "meta": {
            "total_articles": articles.len(),
            "total_pages": pages.len(),
            "generated_at": now_rfc3339(),
        },
        "articles": articles,
        "pages": pages,
    });
    let body = to_body(&payload)?;

    state.cache.set_tagged(
        FEATURED_CACHE_KEY,
        body.clone(),
        state.config.cache.featured_ttl(),
        vec![CacheTag::entity_type("article"), CacheTag::entity_type("page")],
    );
    Ok(json_response(
        StatusCode::OK,
        body,
        "application/json",
        Some(CacheStatus::Miss),
    ))
}

// =============================================================================
// Search
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub limit: Option<String>,
}

/// Validated search input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub q: String,
    pub entity_type: String,
    pub limit: u32,
}

impl SearchQuery {
    pub fn parse(
        params: SearchParams,
        default_limit: u32,
        max_limit: u32,
    ) -> Result<Self, GatewayError> {
        let q = params
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| GatewayError::validation("Search query is required"))?;

        let entity_type = params
            .entity_type
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "article".to_string());
        if !is_machine_name(&entity_type) {
            return Err(GatewayError::validation_with_details(
                "Invalid content type",
                json!({ "type": entity_type }),
            ));
        }

        let limit = match params.limit.as_deref().map(str::trim) {
            None | Some("") => default_limit,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => n.min(max_limit),
                _ => {
                    return Err(GatewayError::validation_with_details(
                        "limit must be a positive integer",
                        json!({ "limit": raw }),
                    ));
                }
            },
        };

        Ok(Self {
            q,
            entity_type,
            limit,
        })
    }

    /// `search:<type>:<limit>:<q>`. The free text goes last and `:` is
    /// outside the machine-name alphabet, so distinct tuples never share a key.
    pub fn cache_key(&self) -> String {
        format!("search:{}:{}:{}", self.entity_type, self.limit, self.q)
    }

    fn engine_request(&self, state: &AppState) -> EngineRequest {
        let value: String = url::form_urlencoded::byte_serialize(self.q.as_bytes()).collect();
        EngineRequest::get(content_api_path(
            state,
            &format!(
                "node/{}?filter[title][operator]=CONTAINS&filter[title][value]={}&page[limit]={}",
                self.entity_type, value, self.limit
            ),
        ))
        .structured_content()
    }
}

/// `GET /search?q=&type=&limit=`: title search over one content type.
#[instrument(skip(state, params))]
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, GatewayError> {
    const CONTEXT: &str = "Search failed";

    let query = SearchQuery::parse(
        params,
        state.config.content.default_search_limit,
        state.config.content.max_search_limit,
    )?;
    let key = query.cache_key();

    if let Some(cached) = state.cache.get(&key) {
        metrics::record_cache_hit("search");
        return Ok(json_response(
            StatusCode::OK,
            cached.to_vec(),
            "application/json",
            Some(CacheStatus::Hit),
        ));
    }
    metrics::record_cache_miss("search");

    let response = call_engine(&state, "search", CONTEXT, query.engine_request(&state)).await?;
    let results = data_items(&expect_json(CONTEXT, &response)?);
    debug!(q = %query.q, results = results.len(), "search completed");

    let payload = json!({
        "query": query.q,
        "type": query.entity_type,
        "meta": {
            "count": results.len(),
            "generated_at": now_rfc3339(),
        },
        "results": results,
    });
    let body = to_body(&payload)?;

    state.cache.set_tagged(
        key,
        body.clone(),
        state.config.cache.search_ttl(),
        vec![CacheTag::entity_type(&query.entity_type)],
    );
    Ok(json_response(
        StatusCode::OK,
        body,
        "application/json",
        Some(CacheStatus::Miss),
    ))
}

// =============================================================================
// Batch
// =============================================================================

/// Validated batch input: unique ids in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub requested: usize,
    pub ids: Vec<String>,
    pub entity_type: String,
}

impl BatchRequest {
    pub fn parse(body: &Value, max_batch_size: usize) -> Result<Self, GatewayError> {
        let Some(raw_ids) = body.get("ids").and_then(Value::as_array) else {
            return Err(GatewayError::validation("IDs array is required"));
        };
        if raw_ids.len() > max_batch_size {
            return Err(GatewayError::validation_with_details(
                "Too many IDs in one batch",
                json!({ "requested": raw_ids.len(), "max_batch_size": max_batch_size }),
            ));
        }

        let mut ids: Vec<String> = Vec::with_capacity(raw_ids.len());
        for (index, raw) in raw_ids.iter().enumerate() {
            let id = scalar_id(raw)
                .filter(|id| is_path_safe_id(id))
                .ok_or_else(|| {
                    GatewayError::validation_with_details(
                        "IDs must be non-empty strings or numbers",
                        json!({ "index": index, "value": raw }),
                    )
                })?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let entity_type = match body.get("type") {
            None | Some(Value::Null) => "node".to_string(),
            Some(Value::String(t)) if t.split('/').all(is_machine_name) => t.clone(),
            Some(other) => {
                return Err(GatewayError::validation_with_details(
                    "Invalid content type",
                    json!({ "type": other }),
                ));
            }
        };

        Ok(Self {
            requested: raw_ids.len(),
            ids,
            entity_type,
        })
    }
}

/// `POST /content/batch`: fetch several items; each id succeeds or fails
/// on its own.
#[instrument(skip(state, body))]
pub async fn batch(State(state): State<AppState>, body: Bytes) -> Result<Response, GatewayError> {
    let request = BatchRequest::parse(&parse_json_body(&body)?, state.config.content.max_batch_size)?;

    let mut data = Map::with_capacity(request.ids.len());
    let mut returned = 0usize;
    let mut failed = 0usize;

    for id in &request.ids {
        let engine_request = EngineRequest::get(content_api_path(
            &state,
            &format!("{}/{}", request.entity_type, id),
        ))
        .structured_content();

        let item = match call_engine(&state, "batch", "Batch item failed", engine_request).await {
            Ok(response) if response.is_success() => match response.payload() {
                Payload::Json(content) => Ok(content),
                Payload::Raw(_) => Err(json!({
                    "error": "Invalid content response",
                    "status": response.status.as_u16(),
                })),
            },
            Ok(response) => Err(json!({
                "error": "Content not found or inaccessible",
                "status": response.status.as_u16(),
            })),
            Err(_) => Err(json!({ "error": "Content engine unavailable" })),
        };

        match item {
            Ok(content) => {
                returned += 1;
                data.insert(id.clone(), content);
            }
            Err(marker) => {
                failed += 1;
                data.insert(id.clone(), marker);
            }
        }
    }

    if failed > 0 {
        info!(requested = request.requested, failed, "batch completed with failures");
    }

    let payload = json!({
        "requested": request.requested,
        "returned": returned,
        "failed": failed,
        "data": data,
    });
    Ok(json_response(StatusCode::OK, to_body(&payload)?, "application/json", None))
}

// =============================================================================
// Preview
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub revision_id: Option<String>,
}

/// `GET /preview/{type}/{id}`: unpublished or revision content for
/// authenticated callers. Never cached.
#[instrument(skip(state, auth, params))]
pub async fn preview(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((entity_type, id)): Path<(String, String)>,
    Query(params): Query<PreviewParams>,
) -> Result<Response, GatewayError> {
    if !auth.is_authenticated() {
        return Err(GatewayError::AuthenticationRequired(
            "Authentication required for preview".to_string(),
        ));
    }
    if !is_machine_name(&entity_type) || !is_path_safe_id(&id) {
        return Err(GatewayError::validation_with_details(
            "Invalid content type or id",
            json!({ "type": entity_type, "id": id }),
        ));
    }
    let revision_id = params.revision_id.filter(|r| !r.is_empty());
    if let Some(revision) = revision_id.as_deref()
        && !is_path_safe_id(revision)
    {
        return Err(GatewayError::validation_with_details(
            "Invalid revision_id",
            json!({ "revision_id": revision }),
        ));
    }

    let mut path = format!("node/{entity_type}/{id}");
    if let Some(revision) = revision_id.as_deref() {
        path.push_str("?revision=");
        path.push_str(revision);
    }
    let engine_request = EngineRequest::get(content_api_path(&state, &path))
        .structured_content()
        .with_header(X_PREVIEW_MODE, HeaderValue::from_static("true"));

    let response = call_engine(&state, "preview", "Preview request failed", engine_request).await?;
    let status = response.status;
    let mut value = response.payload().into_value();

    if let Some(document) = value.as_object_mut() {
        let meta = document.entry("meta").or_insert_with(|| json!({}));
        if !meta.is_object() {
            *meta = json!({});
        }
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("preview".into(), Value::Bool(true));
            meta.insert(
                "revision_id".into(),
                Value::String(revision_id.unwrap_or_else(|| "latest".to_string())),
            );
        }
    }

    Ok(json_response(
        status,
        to_body(&value)?,
        STRUCTURED_CONTENT_TYPE,
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(q: Option<&str>, t: Option<&str>, limit: Option<&str>) -> SearchParams {
        SearchParams {
            q: q.map(String::from),
            entity_type: t.map(String::from),
            limit: limit.map(String::from),
        }
    }

    #[test]
    fn test_search_query_defaults() {
        let query = SearchQuery::parse(params(Some(" drupal "), None, None), 10, 50).unwrap();
        assert_eq!(query.q, "drupal");
        assert_eq!(query.entity_type, "article");
        assert_eq!(query.limit, 10);
        assert_eq!(query.cache_key(), "search:article:10:drupal");
    }

    #[test]
    fn test_search_keys_do_not_collide() {
        let a = SearchQuery::parse(params(Some("x_page"), Some("article"), None), 10, 50).unwrap();
        let b = SearchQuery::parse(params(Some("x"), Some("page_article"), None), 10, 50).unwrap();
        assert_ne!(a.cache_key(), b.cache_key());

        let c = SearchQuery::parse(params(Some("a:1"), Some("page"), None), 10, 50).unwrap();
        let d = SearchQuery::parse(params(Some("1"), Some("page"), Some("1")), 10, 50).unwrap();
        assert_ne!(c.cache_key(), d.cache_key());
    }

    #[test]
    fn test_search_query_rejects_blank_q() {
        assert!(SearchQuery::parse(params(None, None, None), 10, 50).is_err());
        assert!(SearchQuery::parse(params(Some("   "), None, None), 10, 50).is_err());
    }

    #[test]
    fn test_search_query_limit() {
        let query = SearchQuery::parse(params(Some("x"), Some("page"), Some("500")), 10, 50).unwrap();
        assert_eq!(query.limit, 50);
        assert_eq!(query.entity_type, "page");

        assert!(SearchQuery::parse(params(Some("x"), None, Some("0")), 10, 50).is_err());
        assert!(SearchQuery::parse(params(Some("x"), None, Some("-3")), 10, 50).is_err());
        assert!(SearchQuery::parse(params(Some("x"), None, Some("ten")), 10, 50).is_err());
    }

    #[test]
    fn test_search_query_rejects_odd_types() {
        assert!(SearchQuery::parse(params(Some("x"), Some("node/article"), None), 10, 50).is_err());
        assert!(SearchQuery::parse(params(Some("x"), Some("Article"), None), 10, 50).is_err());
    }

    #[test]
    fn test_batch_request_parse() {
        let request = BatchRequest::parse(&json!({"ids": ["a1", 2, "a1"]}), 10).unwrap();
        assert_eq!(request.requested, 3);
        assert_eq!(request.ids, vec!["a1".to_string(), "2".to_string()]);
        assert_eq!(request.entity_type, "node");

        let request = BatchRequest::parse(&json!({"ids": [], "type": "node/article"}), 10).unwrap();
        assert!(request.ids.is_empty());
        assert_eq!(request.entity_type, "node/article");
    }

    #[test]
    fn test_batch_request_rejects_bad_input() {
        assert!(BatchRequest::parse(&json!({}), 10).is_err());
        assert!(BatchRequest::parse(&json!({"ids": "1,2"}), 10).is_err());
        assert!(BatchRequest::parse(&json!({"ids": [true]}), 10).is_err());
        assert!(BatchRequest::parse(&json!({"ids": ["../x"]}), 10).is_err());
        assert!(BatchRequest::parse(&json!({"ids": [1, 2, 3]}), 2).is_err());
        assert!(BatchRequest::parse(&json!({"ids": [1], "type": 5}), 10).is_err());
    }
}
