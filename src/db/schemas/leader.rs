//! Leader (witness) document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderVote {
    pub user_id: String,
    pub weight: i64,
}

/// Community leader keyed by `(communityId, userId)`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LeaderDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub community_id: String,
    pub user_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub rating: i64,
    #[serde(default)]
    pub votes: Vec<LeaderVote>,
    #[serde(default)]
    pub active: bool,
    /// 1-based rank inside the community, `None` while rating is not positive
    #[serde(default)]
    pub position: Option<i64>,
}

impl LeaderDoc {
    pub fn new(community_id: impl Into<String>, user_id: impl Into<String>, url: String) -> Self {
        Self {
            _id: None,
            community_id: community_id.into(),
            user_id: user_id.into(),
            url,
            rating: 0,
            votes: Vec::new(),
            active: true,
            position: None,
        }
    }

    pub fn filter(community_id: &str, user_id: &str) -> Document {
        doc! { "communityId": community_id, "userId": user_id }
    }
}

impl IntoIndexes for LeaderDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "communityId": 1, "userId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("leader_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "communityId": 1, "position": 1 },
                Some(
                    IndexOptions::builder()
                        .name("leader_position".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
