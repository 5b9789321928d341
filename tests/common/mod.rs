//! Shared fixtures: a dispatcher over the in-memory store and builders for
//! contract actions.

#![allow(dead_code)]

use std::sync::Arc;

use bson::Document;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use prism::db::{MemoryStore, Model};
use prism::ingest::{BlockWaiter, Dispatcher, DispatcherConfig, Router, RouterConfig};
use prism::ordering::NestedOrdering;
use prism::types::{Action, Block, ChainEvent, Transaction};

pub const COMMUNITY: &str = "gls";
pub const PUBLISH: &str = "gls.publish";

pub struct Chain {
    pub store: Arc<MemoryStore>,
    pub dispatcher: Dispatcher,
    pub waiter: Arc<BlockWaiter>,
    pub head: u64,
}

impl Chain {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let router = Router::new(store.clone(), RouterConfig::default(), NestedOrdering::new(6));
        let waiter = Arc::new(BlockWaiter::default());
        let dispatcher = Dispatcher::new(
            store.clone(),
            router,
            waiter.clone(),
            DispatcherConfig::default(),
        )
        .await
        .unwrap();
        Self {
            store,
            dispatcher,
            waiter,
            head: 0,
        }
    }

    /// Apply the next block, one transaction per action
    pub async fn block(&mut self, actions: Vec<Action>) -> u64 {
        self.head += 1;
        let num = self.head;
        let block = Block {
            block_num: num,
            block_time: Utc.timestamp_opt(1_767_225_600 + num as i64 * 3, 0).unwrap(),
            id: Some(format!("block-{}", num)),
            transactions: actions
                .into_iter()
                .enumerate()
                .map(|(i, action)| Transaction {
                    id: Some(format!("tx-{}-{}", num, i)),
                    actions: vec![action],
                })
                .collect(),
        };
        assert!(self.dispatcher.process_block(&block).await.unwrap());
        num
    }

    /// Every projected collection, bookkeeping excluded
    pub fn snapshot(&self) -> Vec<(Model, Vec<Document>)> {
        Model::ALL
            .into_iter()
            .filter(Model::is_recorded)
            .map(|model| (model, self.store.snapshot(model)))
            .collect()
    }
}

pub fn action(code: &str, name: &str, args: Value) -> Action {
    Action {
        code: code.into(),
        action: name.into(),
        receiver: code.into(),
        args,
        events: Vec::new(),
    }
}

pub fn with_events(mut action: Action, events: Vec<(&str, Value)>) -> Action {
    action.events = events
        .into_iter()
        .map(|(event, args)| ChainEvent {
            code: PUBLISH.into(),
            event: event.into(),
            args,
        })
        .collect();
    action
}

pub fn new_account(name: &str) -> Action {
    action("cyber", "newaccount", json!({"creator": "cyber", "name": name}))
}

pub fn message_id(author: &str, permlink: &str) -> Value {
    json!({"author": author, "permlink": permlink})
}

pub fn create_post(author: &str, permlink: &str, tags: &[&str]) -> Action {
    action(
        PUBLISH,
        "createmssg",
        json!({
            "message_id": message_id(author, permlink),
            "parent_id": message_id("", ""),
            "headermssg": format!("{} by {}", permlink, author),
            "bodymssg": "hello chain",
            "tags": tags,
        }),
    )
}

pub fn create_comment(author: &str, permlink: &str, parent: (&str, &str)) -> Action {
    action(
        PUBLISH,
        "createmssg",
        json!({
            "message_id": message_id(author, permlink),
            "parent_id": message_id(parent.0, parent.1),
            "bodymssg": "reply",
        }),
    )
}

pub fn upvote(voter: &str, author: &str, permlink: &str) -> Action {
    action(
        PUBLISH,
        "upvote",
        json!({"voter": voter, "message_id": message_id(author, permlink), "weight": 10000}),
    )
}

pub fn update_body(author: &str, permlink: &str, body: &str) -> Action {
    action(
        PUBLISH,
        "updatemssg",
        json!({"message_id": message_id(author, permlink), "bodymssg": body}),
    )
}

pub fn delete(author: &str, permlink: &str) -> Action {
    action(
        PUBLISH,
        "deletemssg",
        json!({"message_id": message_id(author, permlink)}),
    )
}

pub fn repost(rebloger: &str, author: &str, permlink: &str) -> Action {
    action(
        PUBLISH,
        "reblog",
        json!({"rebloger": rebloger, "message_id": message_id(author, permlink)}),
    )
}

pub fn close(author: &str, permlink: &str) -> Action {
    action(
        PUBLISH,
        "closemssg",
        json!({"message_id": message_id(author, permlink)}),
    )
}

pub fn pin(pinner: &str, pinning: &str) -> Action {
    action("gls.social", "pin", json!({"pinner": pinner, "pinning": pinning}))
}

pub fn unpin(pinner: &str, pinning: &str) -> Action {
    action("gls.social", "unpin", json!({"pinner": pinner, "pinning": pinning}))
}

pub fn follow(follower: &str) -> Action {
    action("gls.list", "follow", json!({"follower": follower, "community_code": COMMUNITY}))
}

pub fn unfollow(follower: &str) -> Action {
    action("gls.list", "unfollow", json!({"follower": follower, "community_code": COMMUNITY}))
}

pub fn reg_leader(witness: &str) -> Action {
    action(
        "gls.ctrl",
        "regwitness",
        json!({"witness": witness, "url": format!("https://{}.example", witness)}),
    )
}

pub fn unreg_leader(witness: &str) -> Action {
    action("gls.ctrl", "unregwitness", json!({"witness": witness}))
}

pub fn vote_leader(voter: &str, witness: &str, weight: i64) -> Action {
    action(
        "gls.ctrl",
        "votewitness",
        json!({"voter": voter, "witness": witness, "weight": weight}),
    )
}

pub fn unvote_leader(voter: &str, witness: &str) -> Action {
    action("gls.ctrl", "unvotewitn", json!({"voter": voter, "witness": witness}))
}

/// `[name, value]` settings pairs of a `setparams` action
pub fn set_params(params: Value) -> Action {
    action(PUBLISH, "setparams", json!({"params": params}))
}

/// Multisig proposal wrapping a `setparams` of the test community
pub fn propose_set_params(proposer: &str, name: &str, params: Value) -> Action {
    action(
        "cyber.msig",
        "propose",
        json!({
            "proposer": proposer,
            "proposal_name": name,
            "trx": {
                "expiration": "2026-02-01T00:00:00",
                "actions": [{"account": PUBLISH, "name": "setparams", "data": {"params": params}}],
            },
        }),
    )
}

pub fn approve(proposer: &str, name: &str, actor: &str) -> Action {
    action(
        "cyber.msig",
        "approve",
        json!({
            "proposer": proposer,
            "proposal_name": name,
            "level": {"actor": actor, "permission": "active"},
        }),
    )
}

pub fn exec(proposer: &str, name: &str) -> Action {
    action("cyber.msig", "exec", json!({"proposer": proposer, "proposal_name": name}))
}

pub fn cancel(proposer: &str, name: &str) -> Action {
    action("cyber.msig", "cancel", json!({"proposer": proposer, "proposal_name": name}))
}

/// Integer at a dotted path, whichever width it was stored with
pub fn int_at(doc: &Document, path: &str) -> Option<i64> {
    match prism::db::get_path(doc, path)? {
        bson::Bson::Int32(v) => Some(*v as i64),
        bson::Bson::Int64(v) => Some(*v),
        _ => None,
    }
}
