//! Action router
//!
//! Maps `<contract>-><action>` routing keys onto handler chains. Actions are
//! dispersed strictly one at a time; a later handler in a chain sees the
//! side effects of the earlier ones through the shared [`ActionContext`].

use std::time::Duration;

use tracing::{debug, warn};

use crate::db::SharedStore;
use crate::handlers::vote::VoteKind;
use crate::handlers::{
    community_of, ActionContext, CommunitySettingsHandler, ContentHandler, EventHandler,
    HashTagHandler, LeaderHandler, ProfileHandler, ProposalHandler, SubscribeHandler, VoteHandler,
};
use crate::ordering::NestedOrdering;
use crate::types::{Action, BlockContext, PrismError, Result};
use crate::undo::Mutator;

/// Community used for system contracts (`cyber`, `cyber.domain`, `cyber.msig`)
pub const SYSTEM_COMMUNITY: &str = "cyber";

/// Every routable action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CreateMessage,
    UpdateMessage,
    DeleteMessage,
    Vote(VoteKind),
    Repost,
    EraseRepost,
    ClosePayout,
    SetParams,
    UpdateMeta,
    DeleteMeta,
    Pin,
    Unpin,
    Follow,
    Unfollow,
    RegisterLeader,
    UnregisterLeader,
    StartLeader,
    StopLeader,
    VoteLeader,
    UnvoteLeader,
    NewAccount,
    NewUsername,
    Propose,
    Approve,
    Unapprove,
    Exec,
    Cancel,
}

impl Route {
    pub fn resolve(key: &str) -> Option<Self> {
        let route = match key {
            "publish->createmssg" => Route::CreateMessage,
            "publish->updatemssg" => Route::UpdateMessage,
            "publish->deletemssg" => Route::DeleteMessage,
            "publish->upvote" => Route::Vote(VoteKind::Up),
            "publish->downvote" => Route::Vote(VoteKind::Down),
            "publish->unvote" => Route::Vote(VoteKind::Un),
            "publish->reblog" => Route::Repost,
            "publish->erasereblog" => Route::EraseRepost,
            "publish->closemssg" => Route::ClosePayout,
            "publish->setparams" => Route::SetParams,
            "social->updatemeta" => Route::UpdateMeta,
            "social->deletemeta" => Route::DeleteMeta,
            "social->pin" => Route::Pin,
            "social->unpin" => Route::Unpin,
            "list->follow" => Route::Follow,
            "list->unfollow" => Route::Unfollow,
            "ctrl->regwitness" => Route::RegisterLeader,
            "ctrl->unregwitness" => Route::UnregisterLeader,
            "ctrl->startwitness" => Route::StartLeader,
            "ctrl->stopwitness" => Route::StopLeader,
            "ctrl->votewitness" => Route::VoteLeader,
            "ctrl->unvotewitn" => Route::UnvoteLeader,
            "cyber->newaccount" => Route::NewAccount,
            "cyber.domain->newusername" => Route::NewUsername,
            "cyber.msig->propose" => Route::Propose,
            "cyber.msig->approve" => Route::Approve,
            "cyber.msig->unapprove" => Route::Unapprove,
            "cyber.msig->exec" => Route::Exec,
            "cyber.msig->cancel" => Route::Cancel,
            _ => return None,
        };
        Some(route)
    }
}

/// Community id and routing key of an action
pub fn routing_key(action: &Action) -> (String, String) {
    match community_of(&action.code) {
        Some(community) => {
            let contract = &action.code[community.len() + 1..];
            (
                community.to_string(),
                format!("{}->{}", contract, action.action),
            )
        }
        None => (
            SYSTEM_COMMUNITY.to_string(),
            format!("{}->{}", action.code, action.action),
        ),
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Handlers running longer than this are logged, never aborted
    pub slow_handler_threshold: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            slow_handler_threshold: Duration::from_millis(500),
        }
    }
}

impl RouterConfig {
    pub fn from_args(args: &crate::config::Args) -> Self {
        Self {
            slow_handler_threshold: Duration::from_millis(args.slow_handler_ms),
        }
    }
}

pub struct Router {
    config: RouterConfig,
    content: ContentHandler,
    hashtags: HashTagHandler,
    votes: VoteHandler,
    profiles: ProfileHandler,
    subscriptions: SubscribeHandler,
    leaders: LeaderHandler,
    settings: CommunitySettingsHandler,
    proposals: ProposalHandler,
    events: EventHandler,
}

impl Router {
    pub fn new(store: SharedStore, config: RouterConfig, ordering: NestedOrdering) -> Self {
        let mutator = Mutator::new(store);
        let settings = CommunitySettingsHandler::new(mutator.clone());
        Self {
            config,
            content: ContentHandler::new(mutator.clone(), ordering),
            hashtags: HashTagHandler::new(mutator.clone()),
            votes: VoteHandler::new(mutator.clone()),
            profiles: ProfileHandler::new(mutator.clone()),
            subscriptions: SubscribeHandler::new(mutator.clone()),
            leaders: LeaderHandler::new(mutator.clone()),
            proposals: ProposalHandler::new(mutator.clone(), settings.clone()),
            settings,
            events: EventHandler::new(mutator),
        }
    }

    /// Disperse one action; any handler error is fatal
    pub async fn dispatch(&self, block: &BlockContext, action: &Action) -> Result<()> {
        if action.is_notification() {
            return Ok(());
        }
        let (community_id, key) = routing_key(action);
        let Some(route) = Route::resolve(&key) else {
            if !action.events.is_empty() {
                let ctx = ActionContext::new(block, community_id, action);
                return self
                    .watch(&key, block, self.events.apply_all(&ctx))
                    .await;
            }
            return Ok(());
        };

        debug!(block_num = block.block_num, route = %key, "Dispatching action");
        let mut ctx = ActionContext::new(block, community_id, action);
        let run = async {
            self.run_chain(route, &mut ctx).await?;
            self.events.apply_all(&ctx).await
        };
        self.watch(&key, block, run).await
    }

    async fn watch(
        &self,
        key: &str,
        block: &BlockContext,
        work: impl std::future::Future<Output = Result<()>>,
    ) -> Result<()> {
        tokio::pin!(work);
        let threshold = self.config.slow_handler_threshold;
        let result = tokio::select! {
            result = &mut work => result,
            _ = tokio::time::sleep(threshold) => {
                warn!(
                    block_num = block.block_num,
                    route = %key,
                    threshold_ms = threshold.as_millis() as u64,
                    "Slow handler"
                );
                work.await
            }
        };
        result.map_err(|e| PrismError::fatal(format!("block {} {}", block.block_num, key), e))
    }

    async fn run_chain(&self, route: Route, ctx: &mut ActionContext<'_>) -> Result<()> {
        match route {
            Route::CreateMessage => {
                self.hashtags.extract(ctx).await?;
                self.content.create(ctx).await
            }
            Route::UpdateMessage => {
                self.hashtags.retag(ctx).await?;
                self.content.update(ctx).await
            }
            Route::DeleteMessage => {
                self.hashtags.release(ctx).await?;
                self.content.remove(ctx).await
            }
            Route::Vote(kind) => self.votes.handle(ctx, kind).await,
            Route::Repost => self.content.repost(ctx).await,
            Route::EraseRepost => self.content.erase_repost(ctx).await,
            Route::ClosePayout => self.content.payout(ctx).await,
            Route::SetParams => self.settings.set(ctx).await,
            Route::UpdateMeta => self.profiles.update_meta(ctx).await,
            Route::DeleteMeta => self.profiles.delete_meta(ctx).await,
            Route::Pin => self.subscriptions.pin(ctx).await,
            Route::Unpin => self.subscriptions.unpin(ctx).await,
            Route::Follow => self.subscriptions.follow(ctx).await,
            Route::Unfollow => self.subscriptions.unfollow(ctx).await,
            Route::RegisterLeader => self.leaders.register(ctx).await,
            Route::UnregisterLeader => self.leaders.unregister(ctx).await,
            Route::StartLeader => self.leaders.set_active(ctx, true).await,
            Route::StopLeader => self.leaders.set_active(ctx, false).await,
            Route::VoteLeader => self.leaders.vote(ctx).await,
            Route::UnvoteLeader => self.leaders.unvote(ctx).await,
            Route::NewAccount => self.profiles.create(ctx).await,
            Route::NewUsername => self.profiles.set_username(ctx).await,
            Route::Propose => self.proposals.propose(ctx).await,
            Route::Approve => self.proposals.approve(ctx).await,
            Route::Unapprove => self.proposals.unapprove(ctx).await,
            Route::Exec => self.proposals.exec(ctx).await,
            Route::Cancel => self.proposals.cancel(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(code: &str, name: &str) -> Action {
        Action {
            code: code.into(),
            action: name.into(),
            receiver: code.into(),
            args: json!({}),
            events: vec![],
        }
    }

    #[test]
    fn test_routing_key() {
        assert_eq!(
            routing_key(&action("gls.publish", "createmssg")),
            ("gls".to_string(), "publish->createmssg".to_string())
        );
        assert_eq!(
            routing_key(&action("cyber.domain", "newusername")),
            ("cyber".to_string(), "cyber.domain->newusername".to_string())
        );
        assert_eq!(
            routing_key(&action("cyber", "newaccount")),
            ("cyber".to_string(), "cyber->newaccount".to_string())
        );
    }

    #[test]
    fn test_resolve() {
        assert_eq!(Route::resolve("publish->upvote"), Some(Route::Vote(VoteKind::Up)));
        assert_eq!(Route::resolve("ctrl->unvotewitn"), Some(Route::UnvoteLeader));
        assert_eq!(Route::resolve("cyber.msig->exec"), Some(Route::Exec));
        assert_eq!(Route::resolve("publish->unknown"), None);
    }

    #[tokio::test]
    async fn test_unmatched_and_notifications_ignored() {
        let store: SharedStore = std::sync::Arc::new(crate::db::MemoryStore::new());
        let router = Router::new(store, RouterConfig::default(), NestedOrdering::new(6));
        let block = BlockContext {
            block_num: 1,
            block_time: chrono::Utc::now(),
            transaction_id: None,
            action_seq: 0,
        };
        router.dispatch(&block, &action("gls.publish", "nosuch")).await.unwrap();

        let mut notification = action("gls.publish", "createmssg");
        notification.receiver = "gls.vesting".into();
        notification.args = json!("not an object");
        router.dispatch(&block, &notification).await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_error_is_fatal() {
        let store: SharedStore = std::sync::Arc::new(crate::db::MemoryStore::new());
        let router = Router::new(store, RouterConfig::default(), NestedOrdering::new(6));
        let block = BlockContext {
            block_num: 9,
            block_time: chrono::Utc::now(),
            transaction_id: None,
            action_seq: 0,
        };
        let mut bad = action("gls.publish", "createmssg");
        bad.args = json!("not an object");
        let err = router.dispatch(&block, &bad).await.unwrap_err();
        assert!(matches!(err, PrismError::FatalIngestion(_)));
        assert!(err.to_string().contains("block 9 publish->createmssg"));
    }
}
