//! Multisig proposals
//!
//! Executing a `setparams` proposal applies its settings to the target
//! community through [`CommunitySettingsHandler`].

use bson::doc;
use tracing::{debug, warn};

use super::args::{parse_chain_time, Approval, Propose, ProposalRef};
use super::community::{parse_changes, CommunitySettingsHandler};
use super::{community_of, ActionContext};
use crate::db::schemas::ProposalDoc;
use crate::db::{decode, encode, Model};
use crate::types::Result;
use crate::undo::Mutator;

const SETPARAMS: &str = "setparams";

#[derive(Clone)]
pub struct ProposalHandler {
    mutator: Mutator,
    settings: CommunitySettingsHandler,
}

impl ProposalHandler {
    pub fn new(mutator: Mutator, settings: CommunitySettingsHandler) -> Self {
        Self { mutator, settings }
    }

    pub async fn propose(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: Propose = ctx.args()?;
        let filter = ProposalDoc::filter(&args.proposer, &args.proposal_name);
        if self
            .mutator
            .store()
            .find_one(Model::Proposal, filter)
            .await?
            .is_some()
        {
            debug!(proposer = %args.proposer, proposal = %args.proposal_name, "Proposal exists");
            return Ok(());
        }

        let first = args.trx.actions.first();
        let action = first.map(|a| a.name.clone());
        let changes = match first {
            Some(a) if a.name == SETPARAMS => {
                let params = a
                    .data
                    .get("params")
                    .and_then(|p| p.as_array())
                    .cloned()
                    .unwrap_or_default();
                parse_changes(&params)?
            }
            _ => Vec::new(),
        };

        let proposal = ProposalDoc {
            _id: None,
            user_id: args.proposer.clone(),
            proposal_id: args.proposal_name.clone(),
            community_id: first.and_then(|a| community_of(&a.account)).map(str::to_string),
            action,
            changes,
            approves: Vec::new(),
            is_executed: false,
            expiration: args.trx.expiration.as_deref().and_then(parse_chain_time),
            created_at: ctx.block.block_time_bson(),
        };
        self.mutator
            .create(ctx.block, Model::Proposal, encode(&proposal)?)
            .await?;
        Ok(())
    }

    pub async fn approve(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: Approval = ctx.args()?;
        self.mutator
            .update(
                ctx.block,
                Model::Proposal,
                ProposalDoc::filter(&args.proposer, &args.proposal_name),
                doc! { "$addToSet": { "approves": args.level.actor.as_str() } },
            )
            .await?;
        Ok(())
    }

    pub async fn unapprove(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: Approval = ctx.args()?;
        self.mutator
            .update(
                ctx.block,
                Model::Proposal,
                ProposalDoc::filter(&args.proposer, &args.proposal_name),
                doc! { "$pull": { "approves": args.level.actor.as_str() } },
            )
            .await?;
        Ok(())
    }

    pub async fn exec(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: ProposalRef = ctx.args()?;
        let mut filter = ProposalDoc::filter(&args.proposer, &args.proposal_name);
        filter.insert("isExecuted", false);

        let Some(before) = self
            .mutator
            .update(ctx.block, Model::Proposal, filter, doc! { "$set": { "isExecuted": true } })
            .await?
        else {
            warn!(proposer = %args.proposer, proposal = %args.proposal_name, "Exec of unknown or executed proposal");
            return Ok(());
        };

        let proposal: ProposalDoc = decode(before)?;
        if proposal.action.as_deref() == Some(SETPARAMS) {
            match &proposal.community_id {
                Some(community) => {
                    self.settings
                        .apply(ctx, community, &proposal.changes)
                        .await?
                }
                None => warn!(proposal = %args.proposal_name, "setparams proposal without community"),
            }
        }
        Ok(())
    }

    pub async fn cancel(&self, ctx: &ActionContext<'_>) -> Result<()> {
        let args: ProposalRef = ctx.args()?;
        self.mutator
            .remove(
                ctx.block,
                Model::Proposal,
                ProposalDoc::filter(&args.proposer, &args.proposal_name),
            )
            .await?;
        Ok(())
    }
}
