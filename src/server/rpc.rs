//! JSON-RPC 2.0 envelopes
//!
//! Errors carry the HTTP status of the failure as their `code`, and the HTTP
//! response carries the same status.

use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::api::QueryApi;
use crate::types::PrismError;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: JsonValue,
    pub method: String,
    #[serde(default)]
    pub params: JsonValue,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: JsonValue, err: PrismError) -> (StatusCode, Self) {
        let (status, message) = err.into_status_code_and_body();
        let response = Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code: status.as_u16(),
                message,
            }),
        };
        (status, response)
    }
}

/// Decode one request body, run the method and build the reply
pub async fn handle_rpc(api: &QueryApi, body: &[u8]) -> (StatusCode, RpcResponse) {
    let request: RpcRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            return RpcResponse::failure(
                JsonValue::Null,
                PrismError::Validation(format!("invalid JSON-RPC request: {}", e)),
            )
        }
    };
    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return RpcResponse::failure(
            request.id,
            PrismError::Validation("unsupported jsonrpc version".into()),
        );
    }

    debug!(method = %request.method, "RPC call");
    match api.call(&request.method, request.params).await {
        Ok(result) => (StatusCode::OK, RpcResponse::success(request.id, result)),
        Err(e) => RpcResponse::failure(request.id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiConfig, QueryApi};
    use crate::db::{MemoryStore, SharedStore};
    use crate::feed_cache::{FeedCache, FeedCacheConfig};
    use crate::ingest::BlockWaiter;
    use serde_json::json;
    use std::sync::Arc;

    fn api(cache_enabled: bool) -> QueryApi {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let config = FeedCacheConfig {
            enabled: cache_enabled,
            ..Default::default()
        };
        QueryApi::new(
            store.clone(),
            Arc::new(FeedCache::new(store, config)),
            Arc::new(BlockWaiter::new(1)),
            ApiConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let body = json!({"jsonrpc": "2.0", "id": 7, "method": "content.waitForBlock", "params": {"blockNum": 1}});
        let (status, response) = handle_rpc(&api(true), body.to_string().as_bytes()).await;
        assert_eq!(status, StatusCode::OK);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 7, "result": {"blockNum": 1}}));
    }

    #[tokio::test]
    async fn test_error_code_is_http_status() {
        let body = json!({"jsonrpc": "2.0", "id": "a", "method": "content.getFeed", "params": {"sortBy": "hot"}});
        let (status, response) = handle_rpc(&api(false), body.to_string().as_bytes()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.error.unwrap().code, 405);

        let (status, _) = handle_rpc(&api(true), b"{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stale_cursor_is_gone() {
        let key = crate::api::SequenceKey::Cache { g: "evicted".into(), o: 20 }.encode();
        let body = json!({"id": 1, "method": "content.getFeed", "params": {"sortBy": "trending", "sequenceKey": key}});
        let (status, response) = handle_rpc(&api(true), body.to_string().as_bytes()).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(response.error.unwrap().code, 410);
    }
}
