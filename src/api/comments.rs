//! `content.getComments`
//!
//! Comments of a post are listed in thread order (`ordering.byTime`), newest
//! first by row id, or grouped by top-level comment (`ordering.root`,
//! `ordering.child`). Comments of a user are listed by row id.

use bson::{doc, Document};
use serde::Deserialize;

use super::cursor::SequenceKey;
use super::item::{to_item, with_viewer_votes};
use super::{split_page, Page, QueryApi};
use crate::db::{get_path, FindOptions, Model};
use crate::types::{PrismError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CommentsType {
    #[default]
    Post,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CommentsSort {
    #[default]
    Time,
    TimeDesc,
    Nested,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsParams {
    #[serde(rename = "type", default)]
    pub comments_type: CommentsType,
    /// Author of the post, or the commenter for user listings
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub permlink: Option<String>,
    #[serde(default)]
    pub requested_user_id: Option<String>,
    #[serde(default)]
    pub sort_by: CommentsSort,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sequence_key: Option<String>,
}

impl QueryApi {
    pub async fn get_comments(&self, params: CommentsParams) -> Result<Page> {
        let limit = self.limit(params.limit)?;
        let key = SequenceKey::parse(params.sequence_key.as_deref())?;
        let user = params
            .user_id
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PrismError::Validation("userId is required".into()))?;

        let mut filter = match params.comments_type {
            CommentsType::Post => {
                let permlink = params
                    .permlink
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| PrismError::Validation("permlink is required".into()))?;
                doc! { "parent.post.userId": user, "parent.post.permlink": permlink }
            }
            CommentsType::User => {
                if params.sort_by == CommentsSort::Nested {
                    return Err(PrismError::Validation(
                        "nested order applies to post comments only".into(),
                    ));
                }
                doc! { "contentId.userId": user }
            }
        };

        let (docs, next) = match (params.comments_type, params.sort_by) {
            (CommentsType::Post, CommentsSort::Time) => {
                if let Some(key) = key {
                    filter.insert("ordering.byTime", doc! { "$gt": key.into_ordering()? });
                }
                let (docs, more) = self
                    .comment_rows(filter, doc! { "ordering.byTime": 1 }, None, limit)
                    .await?;
                let next = more
                    .then(|| docs.last().and_then(ordering_key))
                    .flatten()
                    .map(|k| SequenceKey::Ordering { k });
                (docs, next)
            }
            (CommentsType::Post, CommentsSort::Nested) => {
                let offset = key.map(SequenceKey::into_offset).transpose()?.unwrap_or(0);
                let (docs, more) = self
                    .comment_rows(
                        filter,
                        doc! { "ordering.root": 1, "ordering.child": 1 },
                        Some(offset),
                        limit,
                    )
                    .await?;
                let next = more.then(|| SequenceKey::Offset {
                    o: offset + docs.len(),
                });
                (docs, next)
            }
            (_, sort) => {
                let ascending = sort == CommentsSort::Time;
                if let Some(key) = key {
                    let op = if ascending { "$gt" } else { "$lt" };
                    let mut range = Document::new();
                    range.insert(op, key.into_row()?);
                    filter.insert("_id", range);
                }
                let direction = if ascending { 1 } else { -1 };
                let (docs, more) = self
                    .comment_rows(filter, doc! { "_id": direction }, None, limit)
                    .await?;
                let next = more
                    .then(|| docs.last().and_then(|d| d.get_object_id("_id").ok()))
                    .flatten()
                    .map(SequenceKey::row);
                (docs, next)
            }
        };

        let items = docs
            .into_iter()
            .map(|d| with_viewer_votes(to_item(d), params.requested_user_id.as_deref()))
            .collect();
        Ok(Page::new(items, next))
    }

    async fn comment_rows(
        &self,
        filter: Document,
        sort: Document,
        skip: Option<usize>,
        limit: usize,
    ) -> Result<(Vec<Document>, bool)> {
        let mut options = FindOptions::sorted(sort).with_limit(limit as i64 + 1);
        if let Some(skip) = skip.filter(|s| *s > 0) {
            options = options.with_skip(skip as u64);
        }
        let docs = self.store.find(Model::Comment, filter, options).await?;
        Ok(split_page(docs, limit))
    }
}

fn ordering_key(doc: &Document) -> Option<String> {
    get_path(doc, "ordering.byTime")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::api;
    use crate::db::{MemoryStore, SharedStore};
    use std::sync::Arc;

    async fn thread() -> SharedStore {
        let store: SharedStore = Arc::new(MemoryStore::new());
        // inserted out of thread order on purpose
        for (author, by_time, root, child) in [
            ("bob", "0002", "0002", ""),
            ("carol", "0001-0003", "0001", "0003"),
            ("dave", "0001", "0001", ""),
            ("bob", "0001-0004", "0001", "0004"),
        ] {
            store
                .insert_one(
                    Model::Comment,
                    doc! {
                        "contentId": { "userId": author, "permlink": format!("re-{}", by_time) },
                        "parent": { "post": { "userId": "alice", "permlink": "hello" } },
                        "ordering": { "byTime": by_time, "root": root, "child": child },
                    },
                )
                .await
                .unwrap();
        }
        store
    }

    fn post_params() -> CommentsParams {
        CommentsParams {
            user_id: Some("alice".into()),
            permlink: Some("hello".into()),
            ..Default::default()
        }
    }

    fn keys(page: &Page) -> Vec<String> {
        page.items
            .iter()
            .map(|i| i["ordering"]["byTime"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_thread_order_with_key_cursor() {
        let api = api(thread().await);
        let first = api
            .get_comments(CommentsParams { limit: Some(3), ..post_params() })
            .await
            .unwrap();
        assert_eq!(keys(&first), vec!["0001", "0001-0003", "0001-0004"]);

        let second = api
            .get_comments(CommentsParams {
                limit: Some(3),
                sequence_key: first.sequence_key.clone(),
                ..post_params()
            })
            .await
            .unwrap();
        assert_eq!(keys(&second), vec!["0002"]);
        assert!(second.sequence_key.is_none());
    }

    #[tokio::test]
    async fn test_nested_order_uses_offsets() {
        let api = api(thread().await);
        let first = api
            .get_comments(CommentsParams {
                sort_by: CommentsSort::Nested,
                limit: Some(2),
                ..post_params()
            })
            .await
            .unwrap();
        assert_eq!(keys(&first), vec!["0001", "0001-0003"]);
        let second = api
            .get_comments(CommentsParams {
                sort_by: CommentsSort::Nested,
                limit: Some(2),
                sequence_key: first.sequence_key.clone(),
                ..post_params()
            })
            .await
            .unwrap();
        assert_eq!(keys(&second), vec!["0001-0004", "0002"]);
    }

    #[tokio::test]
    async fn test_user_comments() {
        let api = api(thread().await);
        let page = api
            .get_comments(CommentsParams {
                comments_type: CommentsType::User,
                user_id: Some("bob".into()),
                sort_by: CommentsSort::TimeDesc,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(keys(&page), vec!["0001-0004", "0002"]);

        let err = api
            .get_comments(CommentsParams { permlink: None, ..post_params() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
    }
}
