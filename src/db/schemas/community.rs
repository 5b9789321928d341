//! Community-scoped aggregate schemas: reward pool, settings and hashtags

use bigdecimal::BigDecimal;
use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Aggregate reward-fund state of a community, mirrored from `poolstate`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PoolDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub community_id: String,
    pub funds: BigDecimal,
    #[serde(default)]
    pub symbol: String,
    pub r_shares: BigDecimal,
    pub r_shares_fn: BigDecimal,
    #[serde(default)]
    pub msgs: i64,
}

impl PoolDoc {
    pub fn filter(community_id: &str) -> Document {
        doc! { "communityId": community_id }
    }
}

impl IntoIndexes for PoolDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "communityId": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("pool_community_unique".to_string())
                    .build(),
            ),
        )]
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommunitySubscribers {
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub count: i64,
}

/// Community settings map and subscriber set
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommunityDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub community_id: String,
    #[serde(default)]
    pub settings: Document,
    #[serde(default)]
    pub subscribers: CommunitySubscribers,
}

impl CommunityDoc {
    pub fn filter(community_id: &str) -> Document {
        doc! { "communityId": community_id }
    }
}

impl IntoIndexes for CommunityDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "communityId": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("community_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// Per-community usage counter of a tag
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HashtagDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub community_id: String,
    pub tag: String,
    pub count: i64,
}

impl HashtagDoc {
    pub fn filter(community_id: &str, tag: &str) -> Document {
        doc! { "communityId": community_id, "tag": tag }
    }
}

impl IntoIndexes for HashtagDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "communityId": 1, "tag": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("hashtag_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "communityId": 1, "count": -1 },
                Some(IndexOptions::builder().name("hashtag_top".to_string()).build()),
            ),
        ]
    }
}
