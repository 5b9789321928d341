//! Per-block undo stacks

use bson::{doc, Bson};
use tracing::debug;

use crate::db::schemas::{UndoEntry, UndoStackDoc};
use crate::db::{decode, encode, FindOptions, Model, SharedStore};
use crate::types::{BlockContext, Result};

/// Append-only mutation log keyed by block number
#[derive(Clone)]
pub struct UndoLog {
    store: SharedStore,
}

impl UndoLog {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Append an entry to the block's stack, creating the stack on first use
    pub async fn record(&self, ctx: &BlockContext, entry: &UndoEntry) -> Result<()> {
        let entry_doc = encode(entry)?;
        self.store
            .update_one(
                Model::UndoStack,
                doc! { "blockNum": ctx.block_num as i64 },
                doc! {
                    "$push": { "stack": entry_doc },
                    "$setOnInsert": { "blockTime": ctx.block_time_bson() },
                },
                true,
            )
            .await?;
        Ok(())
    }

    /// Highest-numbered stack strictly above `block_num`
    pub async fn latest_above(&self, block_num: u64) -> Result<Option<UndoStackDoc>> {
        let docs = self
            .store
            .find(
                Model::UndoStack,
                doc! { "blockNum": { "$gt": block_num as i64 } },
                FindOptions::sorted(doc! { "blockNum": -1 }).with_limit(1),
            )
            .await?;
        docs.into_iter().next().map(decode).transpose()
    }

    /// Stack of exactly `block_num`
    pub async fn stack_of(&self, block_num: u64) -> Result<Option<UndoStackDoc>> {
        self.store
            .find_one(Model::UndoStack, doc! { "blockNum": block_num as i64 })
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn delete_stack(&self, block_num: i64) -> Result<()> {
        self.store
            .delete_many(Model::UndoStack, doc! { "blockNum": block_num })
            .await?;
        Ok(())
    }

    /// Drop stacks older than `retention` blocks behind `last_block`
    pub async fn prune(&self, last_block: u64, retention: u64) -> Result<u64> {
        if last_block <= retention {
            return Ok(0);
        }
        let horizon = (last_block - retention) as i64;
        let deleted = self
            .store
            .delete_many(
                Model::UndoStack,
                doc! { "blockNum": { "$lt": Bson::Int64(horizon) } },
            )
            .await?;
        if deleted > 0 {
            debug!(horizon, deleted, "Pruned undo stacks");
        }
        Ok(deleted)
    }
}
