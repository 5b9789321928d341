//! Ingestion loop
//!
//! Pulls feed events one at a time: a block is fully dispersed, its position
//! persisted and its waiters notified before the next event is taken. A fork
//! notice switches to [`IngestState::Reverting`], unwinds the undo stacks and
//! ends the loop so the process can restart from the reverted position.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::notify::BlockWaiter;
use super::position::{self, IngestPosition};
use super::router::Router;
use crate::db::SharedStore;
use crate::types::{Block, BlockContext, FeedEvent, ForkNotice, PrismError, Result};
use crate::undo::{ForkReverter, RevertSummary, UndoLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Ingesting,
    Reverting,
}

/// Why the ingestion loop returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    FeedClosed,
    Stopped,
    Reverted {
        rewind_to: u64,
        summary: RevertSummary,
    },
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Undo stacks kept behind the last ingested block
    pub undo_retention_blocks: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            undo_retention_blocks: 1_000,
        }
    }
}

impl DispatcherConfig {
    pub fn from_args(args: &crate::config::Args) -> Self {
        Self {
            undo_retention_blocks: args.undo_retention_blocks,
        }
    }
}

pub struct Dispatcher {
    store: SharedStore,
    router: Router,
    reverter: ForkReverter,
    log: UndoLog,
    waiter: Arc<BlockWaiter>,
    config: DispatcherConfig,
    state: IngestState,
    position: Option<IngestPosition>,
}

impl Dispatcher {
    /// Build a dispatcher resuming from the persisted position
    pub async fn new(
        store: SharedStore,
        router: Router,
        waiter: Arc<BlockWaiter>,
        config: DispatcherConfig,
    ) -> Result<Self> {
        let position = position::load(store.as_ref()).await?;
        match position {
            Some(p) => {
                info!(last_block = p.block_num, "Resuming ingestion");
                waiter.notify(p.block_num, Vec::new());
            }
            None => info!("No ingestion position, starting from the first delivered block"),
        }
        Ok(Self {
            reverter: ForkReverter::new(store.clone()),
            log: UndoLog::new(store.clone()),
            store,
            router,
            waiter,
            config,
            state: IngestState::Ingesting,
            position,
        })
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn position(&self) -> Option<IngestPosition> {
        self.position
    }

    /// Disperse every action of a block; returns `false` for an already
    /// ingested block.
    pub async fn process_block(&mut self, block: &Block) -> Result<bool> {
        if let Some(last) = self.position {
            if block.block_num <= last.block_num {
                debug!(block_num = block.block_num, last = last.block_num, "Skipping ingested block");
                return Ok(false);
            }
            if block.block_num > last.block_num + 1 {
                return Err(PrismError::fatal(
                    format!("block {}", block.block_num),
                    format!("gap in block feed, expected block {}", last.block_num + 1),
                ));
            }
        }

        let mut action_seq: u32 = 0;
        let mut transaction_ids = Vec::new();
        for transaction in &block.transactions {
            for action in &transaction.actions {
                let ctx = BlockContext {
                    block_num: block.block_num,
                    block_time: block.block_time,
                    transaction_id: transaction.id.clone(),
                    action_seq,
                };
                self.router.dispatch(&ctx, action).await?;
                action_seq += 1;
            }
            if let Some(id) = &transaction.id {
                transaction_ids.push(id.clone());
            }
        }

        let next = IngestPosition {
            block_num: block.block_num,
            block_time: Some(bson::DateTime::from_chrono(block.block_time)),
        };
        position::save(self.store.as_ref(), next)
            .await
            .map_err(|e| PrismError::fatal(format!("block {} position", block.block_num), e))?;
        self.position = Some(next);

        self.log
            .prune(block.block_num, self.config.undo_retention_blocks)
            .await?;
        self.waiter.notify(block.block_num, transaction_ids);
        debug!(block_num = block.block_num, actions = action_seq, "Block ingested");
        Ok(true)
    }

    /// Handle a fork notice; `None` when nothing above `rewind_to` was ingested
    pub async fn revert(&mut self, notice: ForkNotice) -> Result<Option<RevertSummary>> {
        let last = self.position.map(|p| p.block_num).unwrap_or(0);
        if notice.rewind_to >= last {
            info!(rewind_to = notice.rewind_to, last, "Fork below ingested range, nothing to revert");
            return Ok(None);
        }

        warn!(rewind_to = notice.rewind_to, last, "Fork detected, reverting");
        self.state = IngestState::Reverting;
        let summary = self.reverter.revert_to(notice.rewind_to).await?;
        self.position = position::load(self.store.as_ref()).await?;
        self.state = IngestState::Ingesting;
        Ok(Some(summary))
    }

    /// Consume the feed until it closes, shutdown is requested or a fork
    /// was reverted.
    pub async fn run(
        mut self,
        mut feed: mpsc::Receiver<FeedEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<IngestOutcome> {
        info!("Ingestion started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Ingestion shutting down");
                    return Ok(IngestOutcome::Stopped);
                }
                event = feed.recv() => {
                    match event {
                        Some(FeedEvent::Block(block)) => {
                            self.process_block(&block).await?;
                        }
                        Some(FeedEvent::Fork(notice)) => {
                            if let Some(summary) = self.revert(notice).await? {
                                return Ok(IngestOutcome::Reverted {
                                    rewind_to: notice.rewind_to,
                                    summary,
                                });
                            }
                        }
                        None => {
                            info!("Block feed closed");
                            return Ok(IngestOutcome::FeedClosed);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, Model};
    use crate::ingest::router::RouterConfig;
    use crate::ordering::NestedOrdering;
    use crate::types::{Action, Transaction};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn block(num: u64, actions: Vec<Action>) -> Block {
        Block {
            block_num: num,
            block_time: Utc.timestamp_opt(1_700_000_000 + num as i64 * 3, 0).unwrap(),
            id: None,
            transactions: vec![Transaction {
                id: Some(format!("tx-{}", num)),
                actions,
            }],
        }
    }

    fn new_account(name: &str) -> Action {
        Action {
            code: "cyber".into(),
            action: "newaccount".into(),
            receiver: "cyber".into(),
            args: json!({"creator": "cyber", "name": name}),
            events: vec![],
        }
    }

    async fn dispatcher(store: &Arc<MemoryStore>) -> Dispatcher {
        let shared: SharedStore = store.clone();
        let router = Router::new(shared.clone(), RouterConfig::default(), NestedOrdering::new(6));
        Dispatcher::new(
            shared,
            router,
            Arc::new(BlockWaiter::default()),
            DispatcherConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_redelivered_block_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = dispatcher(&store).await;

        assert!(dispatcher.process_block(&block(1, vec![new_account("alice")])).await.unwrap());
        assert!(!dispatcher.process_block(&block(1, vec![new_account("bob")])).await.unwrap());
        assert_eq!(store.len(Model::Profile), 1);
        assert_eq!(dispatcher.position().unwrap().block_num, 1);
    }

    #[tokio::test]
    async fn test_gap_in_feed_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = dispatcher(&store).await;
        dispatcher.process_block(&block(1, vec![new_account("alice")])).await.unwrap();

        let err = dispatcher
            .process_block(&block(3, vec![new_account("carol")]))
            .await
            .unwrap_err();
        assert!(matches!(err, PrismError::FatalIngestion(_)));
        assert_eq!(store.len(Model::Profile), 1);
        assert_eq!(dispatcher.position().unwrap().block_num, 1);
        assert!(dispatcher.log.stack_of(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_fails_on_gap() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(&store).await;
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(FeedEvent::Block(block(1, vec![new_account("alice")]))).await.unwrap();
        tx.send(FeedEvent::Block(block(3, vec![new_account("carol")]))).await.unwrap();

        let err = dispatcher.run(rx, shutdown_rx).await.unwrap_err();
        assert!(matches!(err, PrismError::FatalIngestion(_)));
        let position = position::load(store.as_ref()).await.unwrap().unwrap();
        assert_eq!(position.block_num, 1);
    }

    #[tokio::test]
    async fn test_fork_at_or_above_last_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = dispatcher(&store).await;
        dispatcher.process_block(&block(1, vec![new_account("alice")])).await.unwrap();

        let summary = dispatcher.revert(ForkNotice { rewind_to: 1 }).await.unwrap();
        assert!(summary.is_none());
        assert_eq!(dispatcher.state(), IngestState::Ingesting);
    }

    #[tokio::test]
    async fn test_run_reverts_and_stops() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(&store).await;
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(FeedEvent::Block(block(1, vec![new_account("alice")]))).await.unwrap();
        tx.send(FeedEvent::Block(block(2, vec![new_account("bob")]))).await.unwrap();
        tx.send(FeedEvent::Fork(ForkNotice { rewind_to: 1 })).await.unwrap();
        tx.send(FeedEvent::Block(block(3, vec![new_account("carol")]))).await.unwrap();

        let outcome = dispatcher.run(rx, shutdown_rx).await.unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Reverted {
                rewind_to: 1,
                summary: RevertSummary { blocks: 1, entries: 1 },
            }
        );
        assert_eq!(store.len(Model::Profile), 1);
        let position = position::load(store.as_ref()).await.unwrap().unwrap();
        assert_eq!(position.block_num, 1);
    }
}
