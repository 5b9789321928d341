//! Backfill tasks run by `prism-backfill`

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bson::{doc, Bson, Document};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::{BackfillConfig, BackfillSummary, BatchWriter, CancelToken};
use crate::db::schemas::{HashtagDoc, ProfileDoc};
use crate::db::{encode, get_path, DocumentStore, FindOptions, Model, SharedStore};
use crate::types::{PrismError, Result};

/// User ids listed one per line; blank lines and `#` comments are skipped
pub async fn read_user_ids(path: &Path) -> Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Recompute `stats.postsCount` and `stats.commentsCount` per profile.
///
/// Every worker owns one user's profile, so at most `concurrency` profile
/// documents are updated at once and never the same one twice.
pub async fn recount_profiles(
    store: SharedStore,
    config: &BackfillConfig,
    users: Option<Vec<String>>,
    cancel: &CancelToken,
) -> Result<BackfillSummary> {
    let users = match users {
        Some(users) => users,
        None => store
            .distinct(Model::Profile, "userId", Document::new())
            .await?
            .into_iter()
            .filter_map(|v| match v {
                Bson::String(user) => Some(user),
                _ => None,
            })
            .collect(),
    };
    info!(profiles = users.len(), concurrency = config.concurrency, "Recounting profile stats");

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let failed = CancelToken::new();
    let mut workers = JoinSet::new();
    let mut summary = BackfillSummary {
        task: "recount-profiles",
        ..Default::default()
    };

    for user in users {
        if cancel.is_cancelled() || failed.is_cancelled() {
            break;
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PrismError::Internal("Backfill semaphore closed".into()))?;
        let store = store.clone();
        let failed = failed.clone();
        workers.spawn(async move {
            let _permit = permit;
            let result = recount_one(store.as_ref(), &user).await;
            if let Err(e) = &result {
                error!(user = %user, "Recount failed: {}", e);
                failed.cancel();
            }
            result
        });
    }

    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(updated)) => {
                summary.processed += 1;
                if updated {
                    summary.written += 1;
                }
            }
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => {
                first_error.get_or_insert(PrismError::Internal(format!("recount worker: {}", e)));
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    summary.cancelled = cancel.is_cancelled();
    Ok(summary)
}

async fn recount_one(store: &dyn DocumentStore, user: &str) -> Result<bool> {
    let posts = store
        .count(
            Model::Post,
            doc! { "contentId.userId": user, "repost.isRepost": { "$ne": true } },
        )
        .await?;
    let comments = store
        .count(Model::Comment, doc! { "contentId.userId": user })
        .await?;
    let matched = store
        .update_one(
            Model::Profile,
            ProfileDoc::filter(user),
            doc! { "$set": {
                "stats.postsCount": posts as i64,
                "stats.commentsCount": comments as i64,
            } },
            false,
        )
        .await?;
    debug!(user, posts, comments, "Profile recounted");
    Ok(matched > 0)
}

/// Replace all hashtag counters with counts over stored posts and comments.
///
/// Existing counters are only removed once the scan completed, so a
/// cancelled scan leaves them untouched.
pub async fn rebuild_hashtags(
    store: SharedStore,
    config: &BackfillConfig,
    cancel: &CancelToken,
) -> Result<BackfillSummary> {
    let mut summary = BackfillSummary {
        task: "rebuild-hashtags",
        ..Default::default()
    };
    let mut counts: BTreeMap<(String, String), i64> = BTreeMap::new();

    for model in [Model::Post, Model::Comment] {
        let mut after: Option<Bson> = None;
        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                return Ok(summary);
            }
            let mut filter = doc! { "repost.isRepost": { "$ne": true } };
            if let Some(after) = after.take() {
                filter.insert("_id", doc! { "$gt": after });
            }
            let page = store
                .find(
                    model,
                    filter,
                    FindOptions::sorted(doc! { "_id": 1 })
                        .with_limit(config.batch.batch_size as i64),
                )
                .await?;
            let Some(last) = page.last() else { break };
            after = last.get("_id").cloned();
            let full = page.len() >= config.batch.batch_size;

            for content in &page {
                count_tags(content, &mut counts);
            }
            if !full {
                break;
            }
        }
    }
    info!(hashtags = counts.len(), "Scanned content tags");

    let removed = store.delete_many(Model::Hashtag, Document::new()).await?;
    debug!(removed, "Removed previous hashtag counters");

    let mut writer = BatchWriter::new(store.clone(), Model::Hashtag, config.batch.clone());
    for ((community_id, tag), count) in counts {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        writer
            .push(encode(&HashtagDoc {
                _id: None,
                community_id,
                tag,
                count,
            })?)
            .await?;
        summary.processed += 1;
    }
    summary.written = writer.drain().await?;
    Ok(summary)
}

fn count_tags(content: &Document, counts: &mut BTreeMap<(String, String), i64>) {
    let Ok(community) = content.get_str("communityId") else {
        return;
    };
    let Some(Bson::Array(tags)) = get_path(content, "content.tags") else {
        return;
    };
    for tag in tags.iter().filter_map(Bson::as_str) {
        *counts
            .entry((community.to_string(), tag.to_string()))
            .or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::BatchWriterConfig;
    use crate::db::MemoryStore;
    use std::io::Write;
    use std::time::Duration;

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for user in ["alice", "bob"] {
            store
                .insert_one(
                    Model::Profile,
                    doc! { "userId": user, "stats": { "postsCount": 99_i64, "commentsCount": 99_i64 } },
                )
                .await
                .unwrap();
        }
        for (author, permlink, community, tags) in [
            ("alice", "a1", "gls", vec!["rust", "go"]),
            ("alice", "a2", "gls", vec!["rust"]),
            ("bob", "b1", "other", vec!["rust"]),
        ] {
            store
                .insert_one(
                    Model::Post,
                    doc! {
                        "contentId": { "userId": author, "permlink": permlink },
                        "communityId": community,
                        "content": { "tags": tags },
                    },
                )
                .await
                .unwrap();
        }
        store
            .insert_one(
                Model::Post,
                doc! {
                    "contentId": { "userId": "alice", "permlink": "a1" },
                    "communityId": "gls",
                    "content": { "tags": ["rust", "go"] },
                    "repost": { "isRepost": true, "userId": "bob" },
                },
            )
            .await
            .unwrap();
        store
            .insert_one(
                Model::Comment,
                doc! {
                    "contentId": { "userId": "bob", "permlink": "re-a1" },
                    "communityId": "gls",
                    "content": { "tags": ["go"] },
                },
            )
            .await
            .unwrap();
        store
    }

    fn config(batch_size: usize) -> BackfillConfig {
        BackfillConfig {
            concurrency: 2,
            batch: BatchWriterConfig {
                batch_size,
                flush_interval: Duration::from_secs(3600),
            },
        }
    }

    async fn stats(store: &MemoryStore, user: &str) -> (i64, i64) {
        let profile = store
            .find_one(Model::Profile, ProfileDoc::filter(user))
            .await
            .unwrap()
            .unwrap();
        let stats = profile.get_document("stats").unwrap();
        (
            stats.get_i64("postsCount").unwrap(),
            stats.get_i64("commentsCount").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_recount_profiles() {
        let store = seeded().await;
        let summary = recount_profiles(store.clone(), &config(10), None, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.written, 2);
        assert!(!summary.cancelled);
        assert_eq!(stats(&store, "alice").await, (2, 0));
        assert_eq!(stats(&store, "bob").await, (1, 1));
    }

    #[tokio::test]
    async fn test_recount_from_users_file() {
        let store = seeded().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# users to fix\nbob\n\nmallory").unwrap();

        let users = read_user_ids(file.path()).await.unwrap();
        assert_eq!(users, vec!["bob", "mallory"]);

        let summary = recount_profiles(store.clone(), &config(10), Some(users), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(summary.processed, 2);
        // mallory has no profile
        assert_eq!(summary.written, 1);
        assert_eq!(stats(&store, "alice").await, (99, 99));
        assert_eq!(stats(&store, "bob").await, (1, 1));
    }

    #[tokio::test]
    async fn test_cancelled_recount_touches_nothing() {
        let store = seeded().await;
        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = recount_profiles(store.clone(), &config(10), None, &cancel)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
        assert_eq!(stats(&store, "alice").await, (99, 99));
    }

    #[tokio::test]
    async fn test_rebuild_hashtags() {
        let store = seeded().await;
        store
            .insert_one(Model::Hashtag, doc! { "communityId": "gls", "tag": "stale", "count": 7 })
            .await
            .unwrap();

        // batch of 2 forces paged scans and several flushes
        let summary = rebuild_hashtags(store.clone(), &config(2), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.written, 3);

        let count = |community: &str, tag: &str| {
            let store = store.clone();
            let filter = HashtagDoc::filter(community, tag);
            async move {
                store
                    .find_one(Model::Hashtag, filter)
                    .await
                    .unwrap()
                    .map(|d| d.get_i64("count").unwrap())
            }
        };
        assert_eq!(count("gls", "rust").await, Some(2));
        assert_eq!(count("gls", "go").await, Some(2));
        assert_eq!(count("other", "rust").await, Some(1));
        assert_eq!(count("gls", "stale").await, None);
    }

    #[tokio::test]
    async fn test_cancelled_rebuild_keeps_counters() {
        let store = seeded().await;
        store
            .insert_one(Model::Hashtag, doc! { "communityId": "gls", "tag": "rust", "count": 7 })
            .await
            .unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = rebuild_hashtags(store.clone(), &config(2), &cancel).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(store.len(Model::Hashtag), 1);
    }
}
