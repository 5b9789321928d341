//! Post and comment document schema
//!
//! Posts and comments share one document shape and live in separate
//! collections. Comment-only fields (`parent`, `ordering`, `nestedLevel`) and
//! the post-only `repost` block are optional.

use bigdecimal::BigDecimal;
use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::store::Model;

/// Natural key of a post or comment
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ContentId {
    pub user_id: String,
    pub permlink: String,
}

impl ContentId {
    pub fn new(user_id: impl Into<String>, permlink: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            permlink: permlink.into(),
        }
    }

    /// Equality filter on the embedded `contentId` of a document
    pub fn filter(&self) -> Document {
        doc! {
            "contentId.userId": self.user_id.as_str(),
            "contentId.permlink": self.permlink.as_str(),
        }
    }

    pub fn to_bson(&self) -> Bson {
        Bson::Document(doc! { "userId": self.user_id.as_str(), "permlink": self.permlink.as_str() })
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.permlink)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ContentBody {
    pub full: String,
    pub preview: String,
}

/// Title, body variants and metadata of a post or comment
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ContentData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: ContentBody,
    /// Parsed `jsonmetadata`; `None` when absent or unparsable
    #[serde(default)]
    pub metadata: Option<Bson>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub embeds: Vec<Document>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteEntry {
    pub user_id: String,
    #[serde(default)]
    pub weight: i64,
    pub time: DateTime,
    /// Curation weight reported by the chain for up-votes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curator_weight: Option<BigDecimal>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct Votes {
    #[serde(default)]
    pub up_votes: Vec<VoteEntry>,
    #[serde(default)]
    pub up_count: i64,
    #[serde(default)]
    pub down_votes: Vec<VoteEntry>,
    #[serde(default)]
    pub down_count: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContentStats {
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub r_shares: i64,
    #[serde(default)]
    pub hot: f64,
    #[serde(default)]
    pub trending: f64,
}

/// A payout amount split between liquid token and vesting
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TokenVesting {
    pub token: BigDecimal,
    pub vesting: BigDecimal,
}

impl TokenVesting {
    pub fn token(amount: BigDecimal) -> Self {
        Self {
            token: amount,
            vesting: BigDecimal::from(0),
        }
    }

    pub fn vesting(amount: BigDecimal) -> Self {
        Self {
            token: BigDecimal::from(0),
            vesting: amount,
        }
    }
}

/// Chain-reported inputs of the payout computation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayoutMeta {
    pub reward_weight: BigDecimal,
    pub shares_fn: BigDecimal,
    pub sum_curator_sw: BigDecimal,
    #[serde(default)]
    pub benefactor_percents: Vec<i64>,
    pub token_prop: i64,
    pub curators_percent: i64,
}

impl Default for PayoutMeta {
    fn default() -> Self {
        Self {
            reward_weight: BigDecimal::from(10_000),
            shares_fn: BigDecimal::from(0),
            sum_curator_sw: BigDecimal::from(0),
            benefactor_percents: Vec::new(),
            token_prop: 0,
            curators_percent: 0,
        }
    }
}

/// Payout state; every field except `meta` is written once, together with `done`
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Payout {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub author: TokenVesting,
    #[serde(default)]
    pub curator: TokenVesting,
    #[serde(default)]
    pub benefactor: TokenVesting,
    #[serde(default)]
    pub unclaimed: TokenVesting,
    #[serde(default)]
    pub meta: PayoutMeta,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ParentRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<ContentId>,
}

/// Sort keys for nested comment listing
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderingKeys {
    pub by_time: String,
    /// Key of the top-level ancestor comment
    pub root: String,
    /// Remainder of `by_time` below the root, empty for top-level comments
    pub child: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ContentMeta {
    pub time: DateTime,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Repost {
    pub is_repost: bool,
    pub user_id: String,
    pub time: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Shared document shape for posts and comments
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ContentDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub content_id: ContentId,
    pub community_id: String,
    pub content: ContentData,
    #[serde(default)]
    pub votes: Votes,
    #[serde(default)]
    pub stats: ContentStats,
    #[serde(default)]
    pub payout: Payout,
    pub meta: ContentMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<OrderingKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost: Option<Repost>,
}

/// A content document tagged with the collection it belongs to
#[derive(Clone, Debug)]
pub enum Content {
    Post(ContentDoc),
    Comment(ContentDoc),
}

impl Content {
    pub fn model(&self) -> Model {
        match self {
            Content::Post(_) => Model::Post,
            Content::Comment(_) => Model::Comment,
        }
    }

    pub fn doc(&self) -> &ContentDoc {
        match self {
            Content::Post(doc) | Content::Comment(doc) => doc,
        }
    }

    pub fn into_doc(self) -> ContentDoc {
        match self {
            Content::Post(doc) | Content::Comment(doc) => doc,
        }
    }

    /// Post the content belongs to: itself, or the comment's parent post
    pub fn root_post(&self) -> Option<&ContentId> {
        match self {
            Content::Post(doc) => Some(&doc.content_id),
            Content::Comment(doc) => doc.parent.as_ref().and_then(|p| p.post.as_ref()),
        }
    }
}

/// Filter selecting the original (non-repost) post with this id
pub fn original_post_filter(id: &ContentId) -> Document {
    let mut filter = id.filter();
    filter.insert("repost.isRepost", doc! { "$ne": true });
    filter
}

impl IntoIndexes for ContentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "contentId.userId": 1, "contentId.permlink": 1, "repost.userId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("content_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "communityId": 1, "stats.hot": -1 },
                Some(IndexOptions::builder().name("community_hot".to_string()).build()),
            ),
            (
                doc! { "communityId": 1, "stats.trending": -1 },
                Some(
                    IndexOptions::builder()
                        .name("community_trending".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "meta.time": -1 },
                Some(IndexOptions::builder().name("time_index".to_string()).build()),
            ),
            (
                doc! { "parent.post.userId": 1, "parent.post.permlink": 1, "ordering.byTime": 1 },
                Some(
                    IndexOptions::builder()
                        .name("thread_ordering".to_string())
                        .sparse(true)
                        .build(),
                ),
            ),
            (
                doc! { "content.tags": 1 },
                Some(IndexOptions::builder().name("tags_index".to_string()).build()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{decode, encode};

    fn sample() -> ContentDoc {
        ContentDoc {
            _id: None,
            content_id: ContentId::new("alice", "hello"),
            community_id: "gls".into(),
            content: ContentData {
                title: "Hello".into(),
                ..Default::default()
            },
            votes: Votes::default(),
            stats: ContentStats::default(),
            payout: Payout::default(),
            meta: ContentMeta {
                time: DateTime::from_millis(1_700_000_000_000),
            },
            parent: None,
            ordering: None,
            nested_level: None,
            repost: None,
        }
    }

    #[test]
    fn test_decimal_fields_survive_bson() {
        let mut content = sample();
        content.payout.author.token = "168.75".parse().unwrap();

        let doc = encode(&content).unwrap();
        let back: ContentDoc = decode(doc).unwrap();
        assert_eq!(back.payout.author.token, "168.75".parse::<BigDecimal>().unwrap());
        assert_eq!(back.payout.meta.reward_weight, BigDecimal::from(10_000));
    }

    #[test]
    fn test_post_fields_omit_comment_keys() {
        let doc = encode(&sample()).unwrap();
        assert!(!doc.contains_key("parent"));
        assert!(!doc.contains_key("ordering"));
        assert!(!doc.contains_key("_id"));
    }

    #[test]
    fn test_root_post_of_comment() {
        let mut comment = sample();
        comment.parent = Some(ParentRef {
            post: Some(ContentId::new("bob", "root")),
            comment: None,
        });
        let content = Content::Comment(comment);
        assert_eq!(content.model(), Model::Comment);
        assert_eq!(content.root_post(), Some(&ContentId::new("bob", "root")));
    }
}
