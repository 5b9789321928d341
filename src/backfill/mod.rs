//! Offline maintenance of derived counters
//!
//! Backfills write straight to the store without going through the undo
//! log, so they must only run while ingestion is stopped.

pub mod batch;
pub mod tasks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

pub use batch::{BatchWriter, BatchWriterConfig};
pub use tasks::{rebuild_hashtags, recount_profiles, read_user_ids};

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Parallel per-profile workers
    pub concurrency: usize,
    pub batch: BatchWriterConfig,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch: BatchWriterConfig::default(),
        }
    }
}

impl BackfillConfig {
    pub fn from_args(args: &crate::config::BackfillArgs) -> Self {
        Self {
            concurrency: args.concurrency.max(1),
            batch: BatchWriterConfig::from_args(args),
        }
    }
}

/// Cooperative cancellation shared by a backfill and its workers
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancel on the first Ctrl-C
    pub fn cancel_on_ctrl_c(&self) {
        let token = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Interrupt received, stopping after in-flight items");
                    token.cancel();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub task: &'static str,
    /// Keys visited (profiles or hashtags)
    pub processed: usize,
    /// Documents written
    pub written: usize,
    pub cancelled: bool,
}

impl BackfillSummary {
    pub fn log(&self) {
        info!(
            task = self.task,
            processed = self.processed,
            written = self.written,
            cancelled = self.cancelled,
            "Backfill finished"
        );
    }
}
