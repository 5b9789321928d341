//! Multisig proposal document schema

use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// One `[name, value]` settings pair carried by a `setparams` proposal
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SettingChange {
    pub name: String,
    pub value: Bson,
}

/// Proposal keyed by `(userId, proposalId)`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    /// Proposer account
    pub user_id: String,
    pub proposal_id: String,
    /// Community the proposed action targets, when it could be derived
    #[serde(default)]
    pub community_id: Option<String>,
    /// Contract action name, e.g. `setparams`
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub changes: Vec<SettingChange>,
    #[serde(default)]
    pub approves: Vec<String>,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub expiration: Option<DateTime>,
    pub created_at: DateTime,
}

impl ProposalDoc {
    pub fn filter(user_id: &str, proposal_id: &str) -> Document {
        doc! { "userId": user_id, "proposalId": proposal_id }
    }
}

impl IntoIndexes for ProposalDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "userId": 1, "proposalId": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("proposal_unique".to_string())
                    .build(),
            ),
        )]
    }
}
