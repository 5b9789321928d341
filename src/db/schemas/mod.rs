//! Database schemas for Prism
//!
//! Defines the read-model document structures and their indexes.

mod bookkeeping;
mod community;
mod content;
mod leader;
mod profile;
mod proposal;

use bson::Document;
use mongodb::options::IndexOptions;

use super::mongo::IntoIndexes;
use super::store::Model;

pub use bookkeeping::{
    ServiceStateDoc, UndoCommand, UndoEntry, UndoStackDoc, UpdateInverse, SERVICE_STATE_KEY,
};
pub use community::{CommunityDoc, CommunitySubscribers, HashtagDoc, PoolDoc};
pub use content::{
    original_post_filter, Content, ContentBody, ContentData, ContentDoc, ContentId, ContentMeta,
    ContentStats, OrderingKeys, ParentRef, Payout, PayoutMeta, Repost, TokenVesting, VoteEntry,
    Votes,
};
pub use leader::{LeaderDoc, LeaderVote};
pub use profile::{ProfileDoc, ProfileStats, Registration, Subscribers, Subscriptions};
pub use proposal::{ProposalDoc, SettingChange};

/// Index definitions of the schema backing `model`
pub fn indexes_for(model: Model) -> Vec<(Document, Option<IndexOptions>)> {
    match model {
        Model::Post | Model::Comment => ContentDoc::into_indices(),
        Model::Profile => ProfileDoc::into_indices(),
        Model::Leader => LeaderDoc::into_indices(),
        Model::Proposal => ProposalDoc::into_indices(),
        Model::Pool => PoolDoc::into_indices(),
        Model::Hashtag => HashtagDoc::into_indices(),
        Model::Community => CommunityDoc::into_indices(),
        Model::UndoStack => UndoStackDoc::into_indices(),
        Model::ServiceState => ServiceStateDoc::into_indices(),
    }
}
