//! Community leaders (witnesses): registration, activity and voting
//!
//! Every rating change re-ranks the community: position is 1-based by rating
//! descending with ties broken by user id, and `None` for non-positive rating.

use bson::{doc, Bson};
use tracing::{debug, warn};

use super::args::{LeaderRef, LeaderVoteArgs, RegLeader};
use super::ActionContext;
use crate::db::schemas::{LeaderDoc, LeaderVote, ProfileDoc};
use crate::db::{decode, encode, to_bson, FindOptions, Model};
use crate::types::Result;
use crate::undo::Mutator;

#[derive(Clone)]
pub struct LeaderHandler {
    mutator: Mutator,
}

impl LeaderHandler {
    pub fn new(mutator: Mutator) -> Self {
        Self { mutator }
    }

    async fn load(&self, community_id: &str, user_id: &str) -> Result<Option<LeaderDoc>> {
        self.mutator
            .store()
            .find_one(Model::Leader, LeaderDoc::filter(community_id, user_id))
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn register(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: RegLeader = ctx.args()?;
        let community = ctx.community_id.as_str();

        if self.load(community, &args.witness).await?.is_some() {
            self.mutator
                .update(
                    ctx.block,
                    Model::Leader,
                    LeaderDoc::filter(community, &args.witness),
                    doc! { "$set": { "url": args.url.as_str() } },
                )
                .await?;
            return Ok(());
        }

        let leader = LeaderDoc::new(community, args.witness.clone(), args.url.clone());
        self.mutator
            .create(ctx.block, Model::Leader, encode(&leader)?)
            .await?;
        self.mutator
            .update(
                ctx.block,
                Model::Profile,
                ProfileDoc::filter(&args.witness),
                doc! { "$addToSet": { "leaderIn": community } },
            )
            .await?;
        debug!(community, leader = %args.witness, "Leader registered");
        Ok(())
    }

    pub async fn unregister(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: LeaderRef = ctx.args()?;
        let community = ctx.community_id.as_str();

        let removed = self
            .mutator
            .remove(ctx.block, Model::Leader, LeaderDoc::filter(community, &args.witness))
            .await?;
        if removed.is_none() {
            return Ok(());
        }
        self.mutator
            .update(
                ctx.block,
                Model::Profile,
                ProfileDoc::filter(&args.witness),
                doc! { "$pull": { "leaderIn": community } },
            )
            .await?;
        self.recompute_positions(ctx, community).await
    }

    pub async fn set_active(&self, ctx: &ActionContext<'_>, active: bool) -> Result<()> {
        let args: LeaderRef = ctx.args()?;
        self.mutator
            .update(
                ctx.block,
                Model::Leader,
                LeaderDoc::filter(&ctx.community_id, &args.witness),
                doc! { "$set": { "active": active } },
            )
            .await?;
        Ok(())
    }

    pub async fn vote(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: LeaderVoteArgs = ctx.args()?;
        let community = ctx.community_id.as_str();
        let Some(leader) = self.load(community, &args.witness).await? else {
            warn!(community, leader = %args.witness, "Vote for unknown leader ignored");
            return Ok(());
        };
        if leader.votes.iter().any(|v| v.user_id == args.voter) {
            return Ok(());
        }

        let weight = args.weight.unwrap_or(1);
        let mut votes = leader.votes;
        votes.push(LeaderVote {
            user_id: args.voter.clone(),
            weight,
        });
        self.mutator
            .update(
                ctx.block,
                Model::Leader,
                LeaderDoc::filter(community, &args.witness),
                doc! {
                    "$set": { "votes": to_bson(&votes)? },
                    "$inc": { "rating": weight },
                },
            )
            .await?;
        self.recompute_positions(ctx, community).await
    }

    pub async fn unvote(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: LeaderVoteArgs = ctx.args()?;
        let community = ctx.community_id.as_str();
        let Some(leader) = self.load(community, &args.witness).await? else {
            return Ok(());
        };
        let Some(vote) = leader.votes.iter().find(|v| v.user_id == args.voter).cloned() else {
            return Ok(());
        };

        let votes: Vec<LeaderVote> = leader
            .votes
            .into_iter()
            .filter(|v| v.user_id != args.voter)
            .collect();
        self.mutator
            .update(
                ctx.block,
                Model::Leader,
                LeaderDoc::filter(community, &args.witness),
                doc! {
                    "$set": { "votes": to_bson(&votes)? },
                    "$inc": { "rating": -vote.weight },
                },
            )
            .await?;
        self.recompute_positions(ctx, community).await
    }

    /// Rewrite `position` of every leader whose rank changed
    async fn recompute_positions(&self, ctx: &ActionContext<'_>, community: &str) -> Result<()> {
        let docs = self
            .mutator
            .store()
            .find(
                Model::Leader,
                doc! { "communityId": community },
                FindOptions::new(),
            )
            .await?;
        let leaders: Vec<LeaderDoc> = docs.into_iter().map(decode).collect::<Result<_>>()?;

        for (leader, position) in rank_leaders(&leaders) {
            if leader.position == position {
                continue;
            }
            let value = position.map(Bson::Int64).unwrap_or(Bson::Null);
            self.mutator
                .update(
                    ctx.block,
                    Model::Leader,
                    LeaderDoc::filter(community, &leader.user_id),
                    doc! { "$set": { "position": value } },
                )
                .await?;
        }
        Ok(())
    }
}

/// Leaders paired with their computed position
pub fn rank_leaders(leaders: &[LeaderDoc]) -> Vec<(&LeaderDoc, Option<i64>)> {
    let mut ordered: Vec<&LeaderDoc> = leaders.iter().collect();
    ordered.sort_by(|a, b| b.rating.cmp(&a.rating).then_with(|| a.user_id.cmp(&b.user_id)));
    ordered
        .into_iter()
        .enumerate()
        .map(|(idx, leader)| {
            let position = (leader.rating > 0).then_some(idx as i64 + 1);
            (leader, position)
        })
        .collect()
}
