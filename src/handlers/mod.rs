//! Domain handlers
//!
//! Each handler owns one slice of the read-model and applies contract actions
//! to it through the recording [`Mutator`](crate::undo::Mutator).

pub mod args;
pub mod community;
pub mod content;
pub mod events;
pub mod hashtag;
pub mod leader;
pub mod profile;
pub mod proposal;
pub mod subscribe;
pub mod vote;

use serde::de::DeserializeOwned;

use crate::types::{Action, BlockContext, Result};

pub use community::CommunitySettingsHandler;
pub use content::ContentHandler;
pub use events::EventHandler;
pub use hashtag::HashTagHandler;
pub use leader::LeaderHandler;
pub use profile::ProfileHandler;
pub use proposal::ProposalHandler;
pub use subscribe::SubscribeHandler;
pub use vote::VoteHandler;

/// Per-action scratch passed along the handler chain of one action
pub struct ActionContext<'a> {
    pub block: &'a BlockContext,
    pub community_id: String,
    pub action: &'a Action,
    /// Tags resolved by the hashtag handler for the content handler after it
    pub tags: Vec<String>,
}

impl<'a> ActionContext<'a> {
    pub fn new(block: &'a BlockContext, community_id: String, action: &'a Action) -> Self {
        Self {
            block,
            community_id,
            action,
            tags: Vec::new(),
        }
    }

    pub fn args<T: DeserializeOwned>(&self) -> Result<T> {
        args::parse(&self.action.args, &self.action.action)
    }
}

/// Community owning a contract account: `gls.publish` -> `gls`.
///
/// System accounts without a community prefix return `None`.
pub fn community_of(code: &str) -> Option<&str> {
    match code {
        "cyber" | "cyber.domain" | "cyber.msig" | "cyber.token" | "cyber.stake" => None,
        _ => code.split_once('.').map(|(community, _)| community),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_community_of() {
        assert_eq!(community_of("gls.publish"), Some("gls"));
        assert_eq!(community_of("cyber.domain"), None);
        assert_eq!(community_of("cyber"), None);
        assert_eq!(community_of("plain"), None);
    }
}
