//! Fork revert engine
//!
//! Pops undo stacks from the newest block down to `rewind_to + 1`, applying
//! each block's inverses last-in first-out, then moves the ingestion position
//! back to `rewind_to`. Inverse application is idempotent so an interrupted
//! revert can be re-run from the top of the remaining stacks.

use bson::doc;
use tracing::{debug, info};

use super::log::UndoLog;
use crate::db::schemas::{UndoCommand, UndoEntry};
use crate::db::SharedStore;
use crate::ingest::position::{self, IngestPosition};
use crate::types::{PrismError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevertSummary {
    pub blocks: usize,
    pub entries: usize,
}

pub struct ForkReverter {
    store: SharedStore,
    log: UndoLog,
}

impl ForkReverter {
    pub fn new(store: SharedStore) -> Self {
        let log = UndoLog::new(store.clone());
        Self { store, log }
    }

    /// Restore the read-model to the state right after block `rewind_to`.
    ///
    /// Every error is fatal: a half-applied revert leaves no consistent
    /// position to resume ingestion from.
    pub async fn revert_to(&self, rewind_to: u64) -> Result<RevertSummary> {
        self.run(rewind_to)
            .await
            .map_err(|e| PrismError::fatal(format!("fork revert to {}", rewind_to), e))
    }

    async fn run(&self, rewind_to: u64) -> Result<RevertSummary> {
        let mut summary = RevertSummary::default();

        while let Some(stack) = self.log.latest_above(rewind_to).await? {
            debug!(block_num = stack.block_num, entries = stack.stack.len(), "Reverting block");
            for entry in stack.stack.iter().rev() {
                self.apply_inverse(entry).await?;
                summary.entries += 1;
            }
            self.log.delete_stack(stack.block_num).await?;
            summary.blocks += 1;
        }

        let block_time = self
            .log
            .stack_of(rewind_to)
            .await?
            .and_then(|stack| stack.block_time);
        position::save(
            self.store.as_ref(),
            IngestPosition {
                block_num: rewind_to,
                block_time,
            },
        )
        .await?;

        info!(
            rewind_to,
            blocks = summary.blocks,
            entries = summary.entries,
            "Fork revert complete"
        );
        Ok(summary)
    }

    async fn apply_inverse(&self, entry: &UndoEntry) -> Result<()> {
        let by_id = doc! { "_id": entry.document_id };
        match entry.command {
            UndoCommand::Create => {
                self.store.delete_many(entry.model_name, by_id).await?;
            }
            UndoCommand::Update => {
                if !entry.restore.is_empty() {
                    self.store
                        .update_one(entry.model_name, by_id, entry.restore.to_update(), false)
                        .await?;
                }
            }
            UndoCommand::Remove => {
                self.store.delete_many(entry.model_name, by_id).await?;
                self.store
                    .insert_one(entry.model_name, entry.inverse.clone())
                    .await?;
            }
        }
        Ok(())
    }
}
