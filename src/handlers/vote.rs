//! Up-votes, down-votes and vote removal on content

use bson::doc;
use tracing::warn;

use super::args::VoteArgs;
use super::content::{content_filter, find_content};
use super::ActionContext;
use crate::db::schemas::{VoteEntry, Votes};
use crate::db::to_bson;
use crate::types::Result;
use crate::undo::Mutator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Up,
    Down,
    Un,
}

#[derive(Clone)]
pub struct VoteHandler {
    mutator: Mutator,
}

impl VoteHandler {
    pub fn new(mutator: Mutator) -> Self {
        Self { mutator }
    }

    pub async fn handle(&self, ctx: &ActionContext<'_>, kind: VoteKind) -> Result<()> {
        let args: VoteArgs = ctx.args()?;
        let content_id = args.message_id.content_id();
        let Some(content) = find_content(self.mutator.store().as_ref(), &content_id).await? else {
            warn!(content = %content_id, voter = %args.voter, "Vote on unknown content ignored");
            return Ok(());
        };

        let mut votes = content.doc().votes.clone();
        let entry = VoteEntry {
            user_id: args.voter.clone(),
            weight: args.weight,
            time: ctx.block.block_time_bson(),
            curator_weight: None,
        };
        if !apply_vote(&mut votes, kind, entry) {
            return Ok(());
        }

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
}

/// Move the voter between lists; `false` when the vote changes nothing
pub fn apply_vote(votes: &mut Votes, kind: VoteKind, entry: VoteEntry) -> bool {
    let voter = entry.user_id.clone();
    let in_up = votes.up_votes.iter().any(|v| v.user_id == voter);
    let in_down = votes.down_votes.iter().any(|v| v.user_id == voter);

    match kind {
        VoteKind::Up if in_up => return false,
        VoteKind::Down if in_down => return false,
        VoteKind::Un if !in_up && !in_down => return false,
        _ => {}
    }

    votes.up_votes.retain(|v| v.user_id != voter);
    votes.down_votes.retain(|v| v.user_id != voter);
    match kind {
        VoteKind::Up => votes.up_votes.push(entry),
        VoteKind::Down => votes.down_votes.push(entry),
        VoteKind::Un => {}
    }
    votes.up_count = votes.up_votes.len() as i64;
    votes.down_count = votes.down_votes.len() as i64;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::DateTime;

    fn vote(user: &str) -> VoteEntry {
        VoteEntry {
            user_id: user.into(),
            weight: 10_000,
            time: DateTime::from_millis(0),
            curator_weight: None,
        }
    }

    #[test]
    fn test_vote_transitions() {
        let mut votes = Votes::default();
        assert!(apply_vote(&mut votes, VoteKind::Up, vote("a")));
        assert!(!apply_vote(&mut votes, VoteKind::Up, vote("a")));
        assert_eq!((votes.up_count, votes.down_count), (1, 0));

        assert!(apply_vote(&mut votes, VoteKind::Down, vote("a")));
        assert_eq!((votes.up_count, votes.down_count), (0, 1));

        assert!(apply_vote(&mut votes, VoteKind::Un, vote("a")));
        assert_eq!((votes.up_count, votes.down_count), (0, 0));
        assert!(!apply_vote(&mut votes, VoteKind::Un, vote("a")));
    }
}
