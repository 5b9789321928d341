//! Block feed wire types
//!
//! Blocks arrive as JSON from the block feed in canonical order; forks arrive
//! out-of-band as a rewind notice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One block as delivered by the block feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_num: u64,
    pub block_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// A transaction groups actions that were applied atomically on-chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// A contract action plus the ledger events it emitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Contract account, e.g. `gls.publish` or `cyber.domain`
    pub code: String,
    /// Action name, e.g. `createmssg`
    pub action: String,
    /// Account the action was delivered to (notifications repeat the action)
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub args: JsonValue,
    #[serde(default)]
    pub events: Vec<ChainEvent>,
}

impl Action {
    /// Notifications are deliveries of the same action to other accounts;
    /// only the delivery to the contract itself is materialized.
    pub fn is_notification(&self) -> bool {
        !self.receiver.is_empty() && self.receiver != self.code
    }
}

/// Ledger event emitted by a contract while executing an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    pub code: String,
    pub event: String,
    #[serde(default)]
    pub args: JsonValue,
}

/// Fork notification: everything above `rewind_to` is no longer canonical
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ForkNotice {
    pub rewind_to: u64,
}

/// Item on the ingestion queue
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Block(Block),
    Fork(ForkNotice),
}

/// Block-scoped context handed to every handler invocation
#[derive(Debug, Clone)]
pub struct BlockContext {
    pub block_num: u64,
    pub block_time: DateTime<Utc>,
    pub transaction_id: Option<String>,
    /// Position of the action within its block, used as an ordering tiebreak
    pub action_seq: u32,
}

impl BlockContext {
    pub fn block_time_bson(&self) -> bson::DateTime {
        bson::DateTime::from_chrono(self.block_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_deserialization() {
        let json = r#"{
            "blockNum": 42,
            "blockTime": "2026-03-01T12:00:00Z",
            "transactions": [{
                "id": "tx-1",
                "actions": [{
                    "code": "gls.publish",
                    "action": "createmssg",
                    "receiver": "gls.publish",
                    "args": {"message_id": {"author": "alice", "permlink": "hello"}},
                    "events": [{"code": "gls.publish", "event": "poolstate", "args": {"funds": "10.000 GLS"}}]
                }]
            }]
        }"#;

        let block: Block = serde_json::from_str(json).unwrap();
        assert_eq!(block.block_num, 42);
        assert_eq!(block.transactions[0].actions[0].events.len(), 1);
        assert!(!block.transactions[0].actions[0].is_notification());
    }

    #[test]
    fn test_notification_detection() {
        let action = Action {
            code: "gls.publish".into(),
            action: "upvote".into(),
            receiver: "gls.vesting".into(),
            args: JsonValue::Null,
            events: vec![],
        };
        assert!(action.is_notification());
    }

    #[test]
    fn test_fork_notice() {
        let notice: ForkNotice = serde_json::from_str(r#"{"rewindTo": 7}"#).unwrap();
        assert_eq!(notice.rewind_to, 7);
    }
}
