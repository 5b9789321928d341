//! `content.getLeadersTop`

use bson::doc;
use serde::Deserialize;

use super::cursor::SequenceKey;
use super::item::to_item;
use super::{split_page, Page, QueryApi};
use crate::db::{FindOptions, Model};
use crate::types::{PrismError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadersParams {
    pub community_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sequence_key: Option<String>,
}

impl QueryApi {
    /// Leaders of a community by rating, ties broken by user id
    pub async fn get_leaders_top(&self, params: LeadersParams) -> Result<Page> {
        if params.community_id.is_empty() {
            return Err(PrismError::Validation("communityId is required".into()));
        }
        let limit = self.limit(params.limit)?;
        let offset = SequenceKey::parse(params.sequence_key.as_deref())?
            .map(SequenceKey::into_offset)
            .transpose()?
            .unwrap_or(0);

        let mut options =
            FindOptions::sorted(doc! { "rating": -1, "userId": 1 }).with_limit(limit as i64 + 1);
        if offset > 0 {
            options = options.with_skip(offset as u64);
        }
        let docs = self
            .store
            .find(
                Model::Leader,
                doc! { "communityId": params.community_id.as_str() },
                options,
            )
            .await?;

        let (docs, more) = split_page(docs, limit);
        let next = more.then(|| SequenceKey::Offset {
            o: offset + docs.len(),
        });
        Ok(Page::new(docs.into_iter().map(to_item).collect(), next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::api;
    use crate::db::{MemoryStore, SharedStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_leaders_top() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        for (user, rating, community) in [("bob", 5, "gls"), ("alice", 5, "gls"), ("carol", 9, "gls"), ("x", 99, "other")] {
            store
                .insert_one(
                    Model::Leader,
                    doc! { "communityId": community, "userId": user, "rating": rating as i64 },
                )
                .await
                .unwrap();
        }
        let api = api(store);
        let params = LeadersParams {
            community_id: "gls".into(),
            limit: Some(2),
            ..Default::default()
        };
        let first = api.get_leaders_top(params.clone()).await.unwrap();
        let users: Vec<&str> = first.items.iter().map(|i| i["userId"].as_str().unwrap()).collect();
        assert_eq!(users, vec!["carol", "alice"]);

        let second = api
            .get_leaders_top(LeadersParams { sequence_key: first.sequence_key.clone(), ..params })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0]["userId"], "bob");
        assert!(second.sequence_key.is_none());
    }
}
