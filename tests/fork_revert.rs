//! Fork revert integration tests
//!
//! Drives real contract actions through the dispatcher, then rewinds:
//! - the read-model after a revert to block B equals the state right after B
//! - nested reverts peel blocks newest first
//! - the ingestion position follows the rewind
//! - social and governance state (leaders, pins, follows, proposals,
//!   community settings) rewinds the same way as content

mod common;

use common::*;
use prism::db::{DocumentStore, Model};
use prism::types::ForkNotice;
use serde_json::json;

// =============================================================================
// Full rewind
// =============================================================================

#[tokio::test]
async fn test_revert_restores_state_after_target_block() {
    let mut chain = Chain::new().await;
    chain.block(vec![new_account("alice"), new_account("bob")]).await;
    let after_accounts = chain.snapshot();

    chain.block(vec![create_post("alice", "hello", &["rust"])]).await;
    let after_post = chain.snapshot();

    chain
        .block(vec![
            create_comment("bob", "re-hello", ("alice", "hello")),
            upvote("bob", "alice", "hello"),
        ])
        .await;
    chain
        .block(vec![
            update_body("alice", "hello", "now about #golang"),
            repost("bob", "alice", "hello"),
            delete("bob", "re-hello"),
        ])
        .await;
    assert_ne!(chain.snapshot(), after_post);

    let summary = chain
        .dispatcher
        .revert(ForkNotice { rewind_to: 2 })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.blocks, 2);
    assert_eq!(chain.snapshot(), after_post);
    assert_eq!(chain.dispatcher.position().unwrap().block_num, 2);

    let summary = chain
        .dispatcher
        .revert(ForkNotice { rewind_to: 1 })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.blocks, 1);
    assert_eq!(chain.snapshot(), after_accounts);
}

#[tokio::test]
async fn test_revert_drops_undo_stacks_of_reverted_blocks() {
    let mut chain = Chain::new().await;
    chain.block(vec![new_account("alice")]).await;
    chain.block(vec![create_post("alice", "one", &[])]).await;
    chain.block(vec![create_post("alice", "two", &[])]).await;
    assert_eq!(chain.store.len(Model::UndoStack), 3);

    chain
        .dispatcher
        .revert(ForkNotice { rewind_to: 1 })
        .await
        .unwrap();
    assert_eq!(chain.store.len(Model::UndoStack), 1);
    assert!(chain.store.is_empty(Model::Post));
}

// =============================================================================
// Counters
// =============================================================================

#[tokio::test]
async fn test_revert_restores_counters_and_hashtags() {
    let mut chain = Chain::new().await;
    chain.block(vec![new_account("alice"), new_account("bob")]).await;
    chain.block(vec![create_post("alice", "hello", &["rust"])]).await;

    let profile_before = chain
        .store
        .find_one(Model::Profile, bson::doc! { "userId": "alice" })
        .await
        .unwrap()
        .unwrap();
    let tags_before = chain.store.snapshot(Model::Hashtag);
    assert_eq!(tags_before.len(), 1);

    chain.block(vec![delete("alice", "hello")]).await;
    assert!(chain.store.is_empty(Model::Hashtag));

    chain
        .dispatcher
        .revert(ForkNotice { rewind_to: 2 })
        .await
        .unwrap();
    let profile_after = chain
        .store
        .find_one(Model::Profile, bson::doc! { "userId": "alice" })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile_after, profile_before);
    assert_eq!(chain.store.snapshot(Model::Hashtag), tags_before);
}

#[tokio::test]
async fn test_replay_after_revert_converges() {
    let mut chain = Chain::new().await;
    chain.block(vec![new_account("alice")]).await;
    chain.block(vec![create_post("alice", "hello", &["rust"])]).await;
    let canonical = chain.snapshot();

    chain.block(vec![delete("alice", "hello")]).await;
    chain
        .dispatcher
        .revert(ForkNotice { rewind_to: 1 })
        .await
        .unwrap();
    chain.head = 1;

    chain.block(vec![create_post("alice", "hello", &["rust"])]).await;
    let replayed = chain.snapshot();
    // same documents up to freshly assigned ids
    for ((model, expected), (_, actual)) in canonical.iter().zip(replayed.iter()) {
        assert_eq!(expected.len(), actual.len(), "{}", model);
    }
}

// =============================================================================
// Social and governance state
// =============================================================================

#[tokio::test]
async fn test_revert_restores_social_state() {
    let mut chain = Chain::new().await;
    chain
        .block(vec![new_account("alice"), new_account("bob"), new_account("carol")])
        .await;
    chain
        .block(vec![
            reg_leader("alice"),
            reg_leader("bob"),
            vote_leader("carol", "alice", 2),
            vote_leader("carol", "bob", 1),
            pin("alice", "bob"),
            follow("carol"),
            propose_set_params("alice", "limits", json!([["st_max_vote_changes", {"value": 3}]])),
            approve("alice", "limits", "bob"),
        ])
        .await;
    let checkpoint = chain.snapshot();

    chain
        .block(vec![
            unvote_leader("carol", "alice"),
            vote_leader("bob", "bob", 5),
            unpin("alice", "bob"),
            pin("bob", "carol"),
            unfollow("carol"),
            follow("alice"),
            exec("alice", "limits"),
        ])
        .await;
    chain
        .block(vec![
            unreg_leader("alice"),
            set_params(json!([["st_max_vote_changes", {"value": 7}]])),
            propose_set_params("bob", "later", json!([])),
            cancel("bob", "later"),
        ])
        .await;
    assert_ne!(chain.snapshot(), checkpoint);

    let summary = chain
        .dispatcher
        .revert(ForkNotice { rewind_to: 2 })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.blocks, 2);
    assert_eq!(chain.snapshot(), checkpoint);
    assert!(chain
        .store
        .find_one(Model::Proposal, bson::doc! { "proposalId": "limits", "isExecuted": false })
        .await
        .unwrap()
        .is_some());
}
