//! Typed action and event arguments
//!
//! Field names follow the contract ABI; unknown fields are ignored.

use bson::DateTime;
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::db::schemas::ContentId;
use crate::types::{PrismError, Result};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MessageId {
    pub author: String,
    pub permlink: String,
}

impl MessageId {
    pub fn content_id(&self) -> ContentId {
        ContentId::new(self.author.clone(), self.permlink.clone())
    }

    /// Posts carry an empty parent id
    pub fn is_empty(&self) -> bool {
        self.author.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Beneficiary {
    pub account: String,
    pub weight: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessage {
    pub message_id: MessageId,
    #[serde(default)]
    pub parent_id: Option<MessageId>,
    #[serde(default)]
    pub beneficiaries: Vec<Beneficiary>,
    #[serde(default)]
    pub tokenprop: i64,
    #[serde(default)]
    pub headermssg: String,
    #[serde(default)]
    pub bodymssg: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub jsonmetadata: String,
    #[serde(default)]
    pub curators_prcnt: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMessage {
    pub message_id: MessageId,
    #[serde(default)]
    pub headermssg: Option<String>,
    #[serde(default)]
    pub bodymssg: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub jsonmetadata: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteArgs {
    pub voter: String,
    pub message_id: MessageId,
    #[serde(default)]
    pub weight: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepostArgs {
    pub rebloger: String,
    pub message_id: MessageId,
    #[serde(default)]
    pub bodymssg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetParams {
    #[serde(default)]
    pub params: Vec<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMeta {
    pub account: String,
    #[serde(default)]
    pub meta: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRef {
    pub account: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinArgs {
    pub pinner: String,
    pub pinning: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowArgs {
    pub follower: String,
    #[serde(alias = "community_code", alias = "community")]
    pub community_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegLeader {
    pub witness: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderRef {
    pub witness: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderVoteArgs {
    pub voter: String,
    pub witness: String,
    #[serde(default)]
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    #[serde(default)]
    pub creator: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUsername {
    pub creator: String,
    pub owner: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposedAction {
    pub account: String,
    pub name: String,
    #[serde(default)]
    pub data: JsonValue,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProposedTrx {
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub actions: Vec<ProposedAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Propose {
    pub proposer: String,
    pub proposal_name: String,
    #[serde(default)]
    pub trx: ProposedTrx,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionLevel {
    pub actor: String,
    #[serde(default)]
    pub permission: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Approval {
    pub proposer: String,
    pub proposal_name: String,
    pub level: PermissionLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalRef {
    pub proposer: String,
    pub proposal_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostState {
    pub message_id: MessageId,
    #[serde(default)]
    pub netshares: JsonValue,
    #[serde(default)]
    pub voteshares: JsonValue,
    #[serde(default)]
    pub sumcuratorsw: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteState {
    pub voter: String,
    pub message_id: MessageId,
    #[serde(default)]
    pub curatorsw: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardWeight {
    pub message_id: MessageId,
    pub weight: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolState {
    #[serde(default)]
    pub msgs: i64,
    #[serde(default)]
    pub funds: JsonValue,
    #[serde(default)]
    pub rshares: JsonValue,
    #[serde(default)]
    pub rsharesfn: JsonValue,
}

/// Deserialize arguments, reporting the route on failure
pub fn parse<T: serde::de::DeserializeOwned>(value: &JsonValue, what: &str) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| PrismError::Validation(format!("bad {} arguments: {}", what, e)))
}

/// Chain time strings come without a zone (`2026-01-01T00:00:00`) and are UTC
pub fn parse_chain_time(value: &str) -> Option<DateTime> {
    if let Ok(time) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(DateTime::from_chrono(time.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| DateTime::from_chrono(Utc.from_utc_datetime(&naive)))
}
