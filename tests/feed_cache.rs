//! Ranked feed integration tests
//!
//! Exercises `content.getFeed` over the feed cache:
//! - a walk through one generation while newer ones get published
//! - an evicted generation answers 410 mid-walk and restarts at offset 0
//! - a disabled cache answers 405

use std::sync::Arc;
use std::time::Duration;

use bson::doc;
use serde_json::{json, Value};

use prism::api::{ApiConfig, QueryApi, SequenceKey};
use prism::db::{DocumentStore, MemoryStore, Model, SharedStore};
use prism::feed_cache::{FeedCache, FeedCacheConfig, Timeframe};
use prism::ingest::BlockWaiter;

async fn store_with_ranked_posts(count: i64) -> SharedStore {
    let store = Arc::new(MemoryStore::new());
    for n in 0..count {
        store
            .insert_one(
                Model::Post,
                doc! {
                    "contentId": { "userId": "alice", "permlink": format!("p{}", n) },
                    "communityId": "gls",
                    "meta": { "time": bson::DateTime::now() },
                    "stats": { "hot": n as f64, "trending": -(n as f64) },
                },
            )
            .await
            .unwrap();
    }
    store
}

fn api(store: SharedStore, config: FeedCacheConfig) -> QueryApi {
    let cache = Arc::new(FeedCache::new(store.clone(), config));
    QueryApi::new(store, cache, Arc::new(BlockWaiter::default()), ApiConfig::default())
}

fn hot_feed(sequence_key: Option<&str>) -> Value {
    json!({
        "type": "community",
        "communityId": "gls",
        "sortBy": "hot",
        "timeframe": "WilsonHot",
        "limit": 2,
        "sequenceKey": sequence_key,
    })
}

fn permlinks(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["contentId"]["permlink"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Generations
// =============================================================================

#[tokio::test]
async fn test_walk_stays_on_its_generation() {
    let store = store_with_ranked_posts(5).await;
    let config = FeedCacheConfig {
        hop_to_newest: false,
        timeframes: vec![Timeframe::All],
        ..Default::default()
    };
    let api = api(store.clone(), config);
    api.feed_cache().refresh().await.unwrap();

    let first = api.call("content.getFeed", hot_feed(None)).await.unwrap();
    assert_eq!(permlinks(&first), vec!["p4", "p3"]);

    // a new top post lands in the next generation only
    store
        .insert_one(
            Model::Post,
            doc! {
                "contentId": { "userId": "bob", "permlink": "fresh" },
                "communityId": "gls",
                "meta": { "time": bson::DateTime::now() },
                "stats": { "hot": 100.0, "trending": 0.0 },
            },
        )
        .await
        .unwrap();
    api.feed_cache().refresh().await.unwrap();

    let second = api
        .call("content.getFeed", hot_feed(first["sequenceKey"].as_str()))
        .await
        .unwrap();
    assert_eq!(permlinks(&second), vec!["p2", "p1"]);

    let restart = api.call("content.getFeed", hot_feed(None)).await.unwrap();
    assert_eq!(permlinks(&restart), vec!["fresh", "p4"]);
}

#[tokio::test]
async fn test_evicted_generation() {
    let store = store_with_ranked_posts(5).await;
    let config = FeedCacheConfig {
        ttl: Duration::ZERO,
        hop_to_newest: false,
        timeframes: vec![Timeframe::All],
        ..Default::default()
    };
    let api = api(store, config);
    api.feed_cache().refresh().await.unwrap();

    let first = api.call("content.getFeed", hot_feed(None)).await.unwrap();
    let cursor = first["sequenceKey"].as_str().unwrap().to_string();

    // the next refresh supersedes the generation and the zero TTL evicts it
    api.feed_cache().refresh().await.unwrap();

    let err = api
        .call("content.getFeed", hot_feed(Some(&cursor)))
        .await
        .unwrap_err();
    assert_eq!(err.status_code().as_u16(), 410);

    let SequenceKey::Cache { g, .. } = SequenceKey::decode(&cursor).unwrap() else {
        panic!("ranked feeds page by cache cursor");
    };
    let restart = SequenceKey::Cache { g, o: 0 }.encode();
    let page = api
        .call("content.getFeed", hot_feed(Some(&restart)))
        .await
        .unwrap();
    assert_eq!(permlinks(&page), vec!["p4", "p3"]);
}

#[tokio::test]
async fn test_disabled_cache() {
    let store = store_with_ranked_posts(1).await;
    let config = FeedCacheConfig {
        enabled: false,
        ..Default::default()
    };
    let api = api(store, config);
    let err = api.call("content.getFeed", hot_feed(None)).await.unwrap_err();
    assert_eq!(err.status_code().as_u16(), 405);

    // time-sorted feeds never touch the cache
    let page = api
        .call("content.getFeed", json!({"type": "community", "communityId": "gls"}))
        .await
        .unwrap();
    assert_eq!(permlinks(&page).len(), 1);
}
