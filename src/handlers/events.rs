//! Ledger events emitted alongside actions
//!
//! `poolstate` mirrors a community's reward pool, `poststate` refreshes
//! content shares and ranking, `votestate` records a curator's weight and
//! `rewardweight` sets the content reward weight. Payout inputs are frozen
//! once `payout.done` is set.

use bigdecimal::ToPrimitive;
use bson::{doc, Document};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::args::{parse, PoolState, PostState, RewardWeight, VoteState};
use super::community_of;
use super::content::{content_filter, find_content};
use super::ActionContext;
use crate::db::schemas::PoolDoc;
use crate::db::{to_bson, Model};
use crate::reward::{decimal_from_json, normalized, rank, Asset};
use crate::types::{ChainEvent, PrismError, Result};
use crate::undo::Mutator;

#[derive(Clone)]
pub struct EventHandler {
    mutator: Mutator,
}

impl EventHandler {
    pub fn new(mutator: Mutator) -> Self {
        Self { mutator }
    }

    /// Apply the action's events in emission order
    pub async fn apply_all(&self, ctx: &ActionContext<'_>) -> Result<()> {
        for event in &ctx.action.events {
            self.apply(ctx, event).await?;
        }
        Ok(())
    }

    async fn apply(&self, ctx: &ActionContext<'_>, event: &ChainEvent) -> Result<()> {
        match event.event.as_str() {
            "poolstate" => self.pool_state(ctx, event).await,
            "poststate" => self.post_state(ctx, event).await,
            "votestate" => self.vote_state(ctx, event).await,
            "rewardweight" => self.reward_weight(ctx, event).await,
            _ => Ok(()),
        }
    }

    async fn pool_state(&self, ctx: &ActionContext<'_>, event: &ChainEvent) -> Result<()> {
        let community = community_of(&event.code).unwrap_or(ctx.community_id.as_str());
        let raw = event.args.get("state").unwrap_or(&event.args);
        let state: PoolState = parse(raw, "poolstate")?;

        let (funds, symbol) = match &state.funds {
            serde_json::Value::String(s) => {
                let asset: Asset = s.parse()?;
                (asset.amount, asset.symbol)
            }
            other => (decimal_from_json(other)?, String::new()),
        };

        self.mutator
            .upsert(
                ctx.block,
                Model::Pool,
                PoolDoc::filter(community),
                doc! {
                    "$set": {
                        "funds": to_bson(&normalized(funds))?,
                        "symbol": symbol,
                        "rShares": to_bson(&normalized(decimal_from_json(&state.rshares)?))?,
                        "rSharesFn": to_bson(&normalized(decimal_from_json(&state.rsharesfn)?))?,
                        "msgs": state.msgs,
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn post_state(&self, ctx: &ActionContext<'_>, event: &ChainEvent) -> Result<()> {
        let args: PostState = parse(&event.args, "poststate")?;
        let content_id = args.message_id.content_id();
        let Some(content) = find_content(self.mutator.store().as_ref(), &content_id).await? else {
            warn!(content = %content_id, "poststate for unknown content");
            return Ok(());
        };

        let r_shares = net_shares(&args.netshares)?;
        let created = content.doc().meta.time.to_chrono();
        let (hot, trending) = rank(r_shares, created);

        let mut set = doc! {
            "stats.rShares": r_shares,
            "stats.hot": hot,
            "stats.trending": trending,
        };
        if !content.doc().payout.done {
            set.insert(
                "payout.meta.sharesFn",
                to_bson(&normalized(decimal_from_json(&args.voteshares)?))?,
            );
            set.insert(
                "payout.meta.sumCuratorSw",
                to_bson(&normalized(decimal_from_json(&args.sumcuratorsw)?))?,
            );
        }

        self.mutator
            .update(ctx.block, content.model(), content_filter(&content), doc! { "$set": set })
            .await?;
        debug!(content = %content_id, r_shares, hot, "Content ranking updated");
        Ok(())
    }

    async fn vote_state(&self, ctx: &ActionContext<'_>, event: &ChainEvent) -> Result<()> {
        let args: VoteState = parse(&event.args, "votestate")?;
        let content_id = args.message_id.content_id();
        let Some(content) = find_content(self.mutator.store().as_ref(), &content_id).await? else {
            return Ok(());
        };

        let mut votes = content.doc().votes.clone();
        let Some(entry) = votes.up_votes.iter_mut().find(|v| v.user_id == args.voter) else {
            debug!(content = %content_id, voter = %args.voter, "votestate without up-vote");
            return Ok(());
        };
        entry.curator_weight = Some(normalized(decimal_from_json(&args.curatorsw)?));

        self.mutator
            .update(
                ctx.block,
                content.model(),
                content_filter(&content),
                doc! { "$set": { "votes": to_bson(&votes)? } },
            )
            .await?;
        Ok(())
    }

    async fn reward_weight(&self, ctx: &ActionContext<'_>, event: &ChainEvent) -> Result<()> {
        let args: RewardWeight = parse(&event.args, "rewardweight")?;
        let content_id = args.message_id.content_id();
        let Some(content) = find_content(self.mutator.store().as_ref(), &content_id).await? else {
            return Ok(());
        };
        if content.doc().payout.done {
            return Ok(());
        }

        let set: Document = doc! {
            "payout.meta.rewardWeight": to_bson(&normalized(decimal_from_json(&args.weight)?))?,
        };
        self.mutator
            .update(ctx.block, content.model(), content_filter(&content), doc! { "$set": set })
            .await?;
        Ok(())
    }
}

/// Net shares as stored in `stats.rShares`
fn net_shares(value: &JsonValue) -> Result<i64> {
    let shares = decimal_from_json(value)?;
    shares.to_i64().ok_or_else(|| {
        PrismError::Validation(format!("netshares {} out of range", shares))
    })
}
