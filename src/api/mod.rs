//! Read-only query API
//!
//! Methods are plain async functions over the document store, the feed
//! cache and the block waiter; the HTTP server only decodes JSON-RPC
//! envelopes and calls [`QueryApi::call`].

pub mod comments;
pub mod cursor;
pub mod feed;
pub mod item;
pub mod leaders;
pub mod wait;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::db::SharedStore;
use crate::feed_cache::FeedCache;
use crate::ingest::BlockWaiter;
use crate::types::{PrismError, Result};

pub use cursor::SequenceKey;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub wait_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            wait_timeout: Duration::from_secs(10),
        }
    }
}

impl ApiConfig {
    pub fn from_args(args: &crate::config::Args) -> Self {
        Self {
            default_limit: args.page_limit_default,
            max_limit: args.page_limit_max,
            wait_timeout: Duration::from_millis(args.wait_timeout_ms),
        }
    }
}

/// One page of any listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<JsonValue>,
    pub sequence_key: Option<String>,
}

impl Page {
    pub fn new(items: Vec<JsonValue>, next: Option<SequenceKey>) -> Self {
        Self {
            items,
            sequence_key: next.map(|k| k.encode()),
        }
    }
}

pub struct QueryApi {
    store: SharedStore,
    feed_cache: Arc<FeedCache>,
    waiter: Arc<BlockWaiter>,
    config: ApiConfig,
}

impl QueryApi {
    pub fn new(
        store: SharedStore,
        feed_cache: Arc<FeedCache>,
        waiter: Arc<BlockWaiter>,
        config: ApiConfig,
    ) -> Self {
        Self {
            store,
            feed_cache,
            waiter,
            config,
        }
    }

    pub fn feed_cache(&self) -> &FeedCache {
        &self.feed_cache
    }

    pub fn waiter(&self) -> &BlockWaiter {
        &self.waiter
    }

    /// Invoke a method by its JSON-RPC name
    pub async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
        let result = match method {
            "content.getFeed" => to_value(self.get_feed(params_of(params)?).await?)?,
            "content.getComments" => to_value(self.get_comments(params_of(params)?).await?)?,
            "content.getLeadersTop" => to_value(self.get_leaders_top(params_of(params)?).await?)?,
            "content.waitForBlock" => to_value(self.wait_for_block(params_of(params)?).await?)?,
            "content.waitForTransaction" => {
                to_value(self.wait_for_transaction(params_of(params)?).await?)?
            }
            other => return Err(PrismError::NotFound(format!("method {}", other))),
        };
        Ok(result)
    }

    /// Effective page size: default when absent, capped at the maximum
    fn limit(&self, requested: Option<usize>) -> Result<usize> {
        match requested {
            None => Ok(self.config.default_limit),
            Some(0) => Err(PrismError::Validation("limit must be positive".into())),
            Some(n) => Ok(n.min(self.config.max_limit)),
        }
    }
}

fn params_of<T: DeserializeOwned>(params: JsonValue) -> Result<T> {
    let params = match params {
        JsonValue::Null => JsonValue::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(params)
        .map_err(|e| PrismError::Validation(format!("invalid params: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> Result<JsonValue> {
    serde_json::to_value(value).map_err(|e| PrismError::Internal(e.to_string()))
}

/// Items fetched one past the page size tell whether a next page exists
fn split_page<T>(mut rows: Vec<T>, limit: usize) -> (Vec<T>, bool) {
    let more = rows.len() > limit;
    rows.truncate(limit);
    (rows, more)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::feed_cache::FeedCacheConfig;

    pub(crate) fn api(store: SharedStore) -> QueryApi {
        let cache = Arc::new(FeedCache::new(store.clone(), FeedCacheConfig::default()));
        QueryApi::new(store, cache, Arc::new(BlockWaiter::default()), ApiConfig::default())
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let api = api(Arc::new(MemoryStore::new()));
        let err = api.call("content.nope", JsonValue::Null).await.unwrap_err();
        assert_eq!(err.status_code().as_u16(), 404);
    }

    #[test]
    fn test_limit() {
        let api = api(Arc::new(MemoryStore::new()));
        assert_eq!(api.limit(None).unwrap(), 20);
        assert_eq!(api.limit(Some(500)).unwrap(), 100);
        assert!(api.limit(Some(0)).is_err());
    }

    #[test]
    fn test_split_page() {
        assert_eq!(split_page(vec![1, 2, 3], 2), (vec![1, 2], true));
        assert_eq!(split_page(vec![1, 2], 2), (vec![1, 2], false));
    }
}
