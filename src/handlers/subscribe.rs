//! User pins and community follows
//!
//! Both sides of a subscription are add-unique sets; counters move only when
//! the set actually changed, which the conditional filters guarantee.

use bson::{doc, Document};
use tracing::debug;

use super::args::{FollowArgs, PinArgs};
use super::ActionContext;
use crate::db::schemas::{CommunityDoc, ProfileDoc};
use crate::db::{encode, Model};
use crate::types::Result;
use crate::undo::Mutator;

#[derive(Clone)]
pub struct SubscribeHandler {
    mutator: Mutator,
}

impl SubscribeHandler {
    pub fn new(mutator: Mutator) -> Self {
        Self { mutator }
    }

    /// Add `member` to the set at `path`, bumping `counter` if it was absent
    async fn add(
        &self,
        ctx: &ActionContext<'_>,
        model: Model,
        mut filter: Document,
        path: &str,
        counter: &str,
        member: &str,
    ) -> Result<bool> {
        filter.insert(path, doc! { "$ne": member });
        let changed = self
            .mutator
            .update(
                ctx.block,
                model,
                filter,
                doc! { "$addToSet": { path: member }, "$inc": { counter: 1 } },
            )
            .await?;
        Ok(changed.is_some())
    }

    async fn pull(
        &self,
        ctx: &ActionContext<'_>,
        model: Model,
        mut filter: Document,
        path: &str,
        counter: &str,
        member: &str,
    ) -> Result<bool> {
        filter.insert(path, member);
        let changed = self
            .mutator
            .update(
                ctx.block,
                model,
                filter,
                doc! { "$pull": { path: member }, "$inc": { counter: -1 } },
            )
            .await?;
        Ok(changed.is_some())
    }

    pub async fn pin(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: PinArgs = ctx.args()?;
        if args.pinner == args.pinning {
            return Ok(());
        }
        let added = self
            .add(
                ctx,
                Model::Profile,
                ProfileDoc::filter(&args.pinner),
                "subscriptions.userIds",
                "subscriptions.usersCount",
                &args.pinning,
            )
            .await?;
        let added_back = self
            .add(
                ctx,
                Model::Profile,
                ProfileDoc::filter(&args.pinning),
                "subscribers.userIds",
                "subscribers.usersCount",
                &args.pinner,
            )
            .await?;
        debug!(pinner = %args.pinner, pinning = %args.pinning, added, added_back, "Pin");
        Ok(())
    }

    pub async fn unpin(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: PinArgs = ctx.args()?;
        self.pull(
            ctx,
            Model::Profile,
            ProfileDoc::filter(&args.pinner),
            "subscriptions.userIds",
            "subscriptions.usersCount",
            &args.pinning,
        )
        .await?;
        self.pull(
            ctx,
            Model::Profile,
            ProfileDoc::filter(&args.pinning),
            "subscribers.userIds",
            "subscribers.usersCount",
            &args.pinner,
        )
        .await?;
        Ok(())
    }

    pub async fn follow(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: FollowArgs = ctx.args()?;
        self.ensure_community(ctx, &args.community_id).await?;

        self.add(
            ctx,
            Model::Profile,
            ProfileDoc::filter(&args.follower),
            "subscriptions.communityIds",
            "subscriptions.communitiesCount",
            &args.community_id,
        )
        .await?;
        self.add(
            ctx,
            Model::Community,
            CommunityDoc::filter(&args.community_id),
            "subscribers.userIds",
            "subscribers.count",
            &args.follower,
        )
        .await?;
        Ok(())
    }

    pub async fn unfollow(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: FollowArgs = ctx.args()?;
        self.pull(
            ctx,
            Model::Profile,
            ProfileDoc::filter(&args.follower),
            "subscriptions.communityIds",
            "subscriptions.communitiesCount",
            &args.community_id,
        )
        .await?;
        self.pull(
            ctx,
            Model::Community,
            CommunityDoc::filter(&args.community_id),
            "subscribers.userIds",
            "subscribers.count",
            &args.follower,
        )
        .await?;
        Ok(())
    }

    async fn ensure_community(&self, ctx: &ActionContext<'_>, community_id: &str) -> Result<()> {
        let store = self.mutator.store();
        if store
            .find_one(Model::Community, CommunityDoc::filter(community_id))
            .await?
            .is_none()
        {
            let community = CommunityDoc {
                _id: None,
                community_id: community_id.to_string(),
                settings: Document::new(),
                subscribers: Default::default(),
            };
            self.mutator
                .create(ctx.block, Model::Community, encode(&community)?)
                .await?;
        }
        Ok(())
    }
}
