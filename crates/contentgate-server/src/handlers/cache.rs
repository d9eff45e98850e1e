//! Cache administration and the invalidation webhook.

use axum::{Json, body::Bytes, extract::State};
use contentgate_core::CacheTag;
use serde_json::{Value, json};
use tracing::info;

use super::{parse_json_body, scalar_id};
use crate::gateway::GatewayError;
use crate::metrics;
use crate::server::AppState;

/// Entity named by an invalidation webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationTarget {
    pub entity_type: String,
    pub entity_id: String,
    pub action: Option<String>,
}

impl InvalidationTarget {
    pub fn parse(body: &Value) -> Result<Self, GatewayError> {
        let field = |name: &str| {
            body.get(name)
                .and_then(scalar_id)
                .filter(|value| !value.is_empty())
        };
        let (Some(entity_type), Some(entity_id)) = (field("entity_type"), field("entity_id"))
        else {
            return Err(GatewayError::validation(
                "entity_type and entity_id are required",
            ));
        };
        let action = body
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            entity_type,
            entity_id,
            action,
        })
    }
}

/// `POST /cache/invalidate`: drop every entry related to one entity.
///
/// Removes keys containing the entity type or id, plus entries tagged with
/// the entity or its type. Invalidating an unknown entity removes nothing.
pub async fn invalidate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let target = InvalidationTarget::parse(&parse_json_body(&body)?)?;

    let removed = state.cache.delete_matching(&target.entity_type)
        + state.cache.delete_matching(&target.entity_id)
        + state
            .cache
            .delete_tagged(&CacheTag::entity(&target.entity_type, &target.entity_id))
        + state
            .cache
            .delete_tagged(&CacheTag::entity_type(&target.entity_type));

    metrics::record_cache_invalidation("webhook", removed);
    info!(
        entity_type = %target.entity_type,
        entity_id = %target.entity_id,
        action = target.action.as_deref().unwrap_or("-"),
        removed,
        "Cache invalidated"
    );

    Ok(Json(json!({
        "message": "Cache invalidated successfully",
        "invalidated_keys": removed,
        "entity": { "type": target.entity_type, "id": target.entity_id },
        "action": target.action,
    })))
}

/// `DELETE /cache`: drop everything.
pub async fn flush(State(state): State<AppState>) -> Json<Value> {
    let removed = state.cache.flush();
    metrics::record_cache_invalidation("flush", removed);
    Json(json!({
        "message": "Cache flushed",
        "removed": removed,
    }))
}

/// `GET /cache/stats`
pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.cache.stats();
    metrics::set_cache_entries(stats.count);
    Json(json!({
        "keys": stats.count,
        "hits": stats.hits,
        "misses": stats.misses,
        "hit_rate": stats.hit_rate(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse() {
        let target = InvalidationTarget::parse(&json!({
            "entity_type": "article",
            "entity_id": 42,
            "action": "update",
        }))
        .unwrap();
        assert_eq!(target.entity_type, "article");
        assert_eq!(target.entity_id, "42");
        assert_eq!(target.action.as_deref(), Some("update"));
    }

    #[test]
    fn test_target_requires_both_fields() {
        assert!(InvalidationTarget::parse(&json!({"entity_type": "article"})).is_err());
        assert!(InvalidationTarget::parse(&json!({"entity_id": "1"})).is_err());
        assert!(
            InvalidationTarget::parse(&json!({"entity_type": " ", "entity_id": "1"})).is_err()
        );
        assert!(
            InvalidationTarget::parse(&json!({"entity_type": {}, "entity_id": "1"})).is_err()
        );
    }
}
