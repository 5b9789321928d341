//! `content.getFeed`

use std::collections::HashMap;

use bson::{doc, oid::ObjectId, Bson, Document};
use serde::Deserialize;

use super::cursor::SequenceKey;
use super::item::{to_item, with_viewer_votes};
use super::{split_page, Page, QueryApi};
use crate::db::schemas::ProfileDoc;
use crate::db::{decode, FindOptions, Model};
use crate::feed_cache::{CacheKey, SortBy, Timeframe, ALL_SCOPE};
use crate::types::{PrismError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum FeedType {
    #[default]
    New,
    Community,
    Subscriptions,
    ByUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedParams {
    #[serde(rename = "type", default)]
    pub feed_type: FeedType,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub community_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Viewer whose votes are flagged on the items
    #[serde(default)]
    pub requested_user_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sequence_key: Option<String>,
}

enum FeedSort {
    Time { ascending: bool },
    Ranked(SortBy),
}

fn parse_sort(raw: Option<&str>) -> Result<FeedSort> {
    match raw.unwrap_or("timeDesc") {
        "time" => Ok(FeedSort::Time { ascending: true }),
        "timeDesc" => Ok(FeedSort::Time { ascending: false }),
        other => other.parse().map(FeedSort::Ranked),
    }
}

impl QueryApi {
    pub async fn get_feed(&self, params: FeedParams) -> Result<Page> {
        let limit = self.limit(params.limit)?;
        let key = SequenceKey::parse(params.sequence_key.as_deref())?;

        match parse_sort(params.sort_by.as_deref())? {
            FeedSort::Ranked(sort_by) => self.ranked_feed(&params, sort_by, key, limit).await,
            FeedSort::Time { ascending } => {
                let filter = self.feed_filter(&params).await?;
                self.time_feed(&params, filter, ascending, key, limit).await
            }
        }
    }

    async fn ranked_feed(
        &self,
        params: &FeedParams,
        sort_by: SortBy,
        key: Option<SequenceKey>,
        limit: usize,
    ) -> Result<Page> {
        let scope = match params.feed_type {
            FeedType::New => ALL_SCOPE.to_string(),
            FeedType::Community => required(&params.community_id, "communityId")?.to_string(),
            _ => {
                return Err(PrismError::Validation(
                    "ranked feeds exist for new and community feeds only".into(),
                ))
            }
        };
        if !params.tags.is_empty() {
            return Err(PrismError::Validation("tags filter needs a time sort".into()));
        }
        let timeframe: Timeframe = params.timeframe.as_deref().unwrap_or("day").parse()?;
        let cache_key = CacheKey::new(scope, sort_by, timeframe);

        let cursor = key.map(SequenceKey::into_cache).transpose()?;
        let page = self
            .feed_cache
            .get_page(&cache_key, cursor.as_ref(), limit)?;

        let ids: Vec<Bson> = page.ids.iter().map(|id| Bson::ObjectId(*id)).collect();
        let docs = self
            .store
            .find(Model::Post, doc! { "_id": { "$in": ids } }, FindOptions::new())
            .await?;
        let mut by_id: HashMap<ObjectId, Document> = docs
            .into_iter()
            .filter_map(|d| d.get_object_id("_id").ok().map(|id| (id, d)))
            .collect();
        // ranked order; posts deleted since the refresh are dropped
        let items = page
            .ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .map(|d| with_viewer_votes(to_item(d), params.requested_user_id.as_deref()))
            .collect();

        Ok(Page::new(items, page.next.as_ref().map(SequenceKey::from_cache)))
    }

    async fn time_feed(
        &self,
        params: &FeedParams,
        mut filter: Document,
        ascending: bool,
        key: Option<SequenceKey>,
        limit: usize,
    ) -> Result<Page> {
        if let Some(key) = key {
            let after = key.into_row()?;
            let op = if ascending { "$gt" } else { "$lt" };
            let mut range = Document::new();
            range.insert(op, after);
            filter.insert("_id", range);
        }
        let direction = if ascending { 1 } else { -1 };
        let docs = self
            .store
            .find(
                Model::Post,
                filter,
                FindOptions::sorted(doc! { "_id": direction }).with_limit(limit as i64 + 1),
            )
            .await?;

        let (docs, more) = split_page(docs, limit);
        let next = if more {
            docs.last()
                .and_then(|d| d.get_object_id("_id").ok())
                .map(SequenceKey::row)
        } else {
            None
        };
        let items = docs
            .into_iter()
            .map(|d| with_viewer_votes(to_item(d), params.requested_user_id.as_deref()))
            .collect();
        Ok(Page::new(items, next))
    }

    async fn feed_filter(&self, params: &FeedParams) -> Result<Document> {
        let original = doc! { "repost.isRepost": { "$ne": true } };
        let mut filter = match params.feed_type {
            FeedType::New => original,
            FeedType::Community => {
                let mut filter = original;
                filter.insert("communityId", required(&params.community_id, "communityId")?);
                filter
            }
            FeedType::ByUser => {
                let user = required(&params.user_id, "userId")?;
                doc! {
                    "$or": [
                        { "contentId.userId": user, "repost.isRepost": { "$ne": true } },
                        { "repost.userId": user },
                    ]
                }
            }
            FeedType::Subscriptions => {
                let user = required(&params.user_id, "userId")?;
                let profile: ProfileDoc = self
                    .store
                    .find_one(Model::Profile, ProfileDoc::filter(user))
                    .await?
                    .map(decode)
                    .transpose()?
                    .ok_or_else(|| PrismError::NotFound(format!("profile {}", user)))?;
                let users = profile.subscriptions.user_ids;
                let communities = profile.subscriptions.community_ids;
                doc! {
                    "$or": [
                        { "contentId.userId": { "$in": users.clone() }, "repost.isRepost": { "$ne": true } },
                        { "repost.userId": { "$in": users } },
                        { "communityId": { "$in": communities }, "repost.isRepost": { "$ne": true } },
                    ]
                }
            }
        };
        if !params.tags.is_empty() {
            let tags: Vec<String> = params.tags.iter().map(|t| t.to_lowercase()).collect();
            filter.insert("content.tags", doc! { "$in": tags });
        }
        Ok(filter)
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PrismError::Validation(format!("{} is required", name)))
}
