//! Ingestion bookkeeping: per-block undo stacks and the ingestion position

use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::store::Model;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UndoCommand {
    Create,
    Update,
    Remove,
}

/// One recorded mutation and the data that reverses it
///
/// - `create`: nothing stored, revert deletes `documentId`
/// - `update`: `restore` holds the touched fields' previous values
/// - `remove`: `inverse` is the full removed document, revert re-inserts it
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UndoEntry {
    pub command: UndoCommand,
    pub model_name: Model,
    pub document_id: ObjectId,
    #[serde(default)]
    pub inverse: Document,
    #[serde(default, skip_serializing_if = "UpdateInverse::is_empty")]
    pub restore: UpdateInverse,
}

/// Previous values of the top-level fields an update touched.
///
/// Kept as plain data: update operator names cannot be stored as field
/// names, so the `$set`/`$unset` document is only built at revert time.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UpdateInverse {
    /// Fields to put back with their old value
    #[serde(default)]
    pub set: Document,
    /// Fields that did not exist before the update
    #[serde(default)]
    pub unset: Vec<String>,
}

impl UpdateInverse {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Operator update document restoring the recorded fields
    pub fn to_update(&self) -> Document {
        let mut update = Document::new();
        if !self.set.is_empty() {
            update.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            let unset: Document = self
                .unset
                .iter()
                .map(|field| (field.clone(), Bson::String(String::new())))
                .collect();
            update.insert("$unset", unset);
        }
        update
    }
}

/// Mutation log of a single block, in mutation order
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UndoStackDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub block_num: i64,
    #[serde(default)]
    pub block_time: Option<DateTime>,
    #[serde(default)]
    pub stack: Vec<UndoEntry>,
}

impl IntoIndexes for UndoStackDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "blockNum": -1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("block_num_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// Singleton key of the ingestion position document
pub const SERVICE_STATE_KEY: &str = "ingestion";

/// Last fully ingested block
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStateDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub key: String,
    pub last_block_num: i64,
    #[serde(default)]
    pub last_block_time: Option<DateTime>,
}

impl ServiceStateDoc {
    pub fn filter() -> Document {
        doc! { "key": SERVICE_STATE_KEY }
    }
}

impl IntoIndexes for ServiceStateDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "key": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("service_state_key".to_string())
                    .build(),
            ),
        )]
    }
}
