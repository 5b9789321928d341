//! Profile document schema

use std::collections::BTreeMap;

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Subscriptions {
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub users_count: i64,
    #[serde(default)]
    pub community_ids: Vec<String>,
    #[serde(default)]
    pub communities_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Subscribers {
    #[serde(default)]
    pub user_ids: Vec<String>,
    #[serde(default)]
    pub users_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    #[serde(default)]
    pub reputation: i64,
    #[serde(default)]
    pub posts_count: i64,
    #[serde(default)]
    pub comments_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Registration {
    pub time: DateTime,
}

/// Account profile, keyed by `userId`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub user_id: String,
    /// Username per app (community id)
    #[serde(default)]
    pub usernames: BTreeMap<String, String>,
    /// Personal metadata per app
    #[serde(default)]
    pub personal: BTreeMap<String, Document>,
    #[serde(default)]
    pub subscriptions: Subscriptions,
    #[serde(default)]
    pub subscribers: Subscribers,
    #[serde(default)]
    pub stats: ProfileStats,
    /// Communities where this account is a registered leader
    #[serde(default)]
    pub leader_in: Vec<String>,
    pub registration: Registration,
}

impl ProfileDoc {
    pub fn new(user_id: impl Into<String>, registered_at: DateTime) -> Self {
        Self {
            _id: None,
            user_id: user_id.into(),
            usernames: BTreeMap::new(),
            personal: BTreeMap::new(),
            subscriptions: Subscriptions::default(),
            subscribers: Subscribers::default(),
            stats: ProfileStats::default(),
            leader_in: Vec::new(),
            registration: Registration {
                time: registered_at,
            },
        }
    }

    pub fn filter(user_id: &str) -> Document {
        doc! { "userId": user_id }
    }
}

impl IntoIndexes for ProfileDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "userId": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}
