//! Buffered inserts for bulk rebuilds
//!
//! Documents are pushed one at a time and written with `insert_many` once the
//! buffer reaches the batch size or the oldest buffered document has waited
//! for the flush interval. Whatever is still buffered is written by
//! [`BatchWriter::drain`]; dropping a writer with pending documents loses them.

use std::time::{Duration, Instant};

use bson::Document;
use tracing::{debug, warn};

use crate::db::{Model, SharedStore};
use crate::types::Result;

#[derive(Debug, Clone)]
pub struct BatchWriterConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            flush_interval: Duration::from_secs(2),
        }
    }
}

impl BatchWriterConfig {
    pub fn from_args(args: &crate::config::BackfillArgs) -> Self {
        Self {
            batch_size: args.batch_size.max(1),
            flush_interval: Duration::from_millis(args.flush_interval_ms),
        }
    }
}

pub struct BatchWriter {
    store: SharedStore,
    model: Model,
    config: BatchWriterConfig,
    buffer: Vec<Document>,
    oldest: Option<Instant>,
    written: usize,
    flushes: usize,
}

impl BatchWriter {
    pub fn new(store: SharedStore, model: Model, config: BatchWriterConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(config.batch_size),
            store,
            model,
            config,
            oldest: None,
            written: 0,
            flushes: 0,
        }
    }

    /// Buffer one document, flushing when a threshold is reached
    pub async fn push(&mut self, doc: Document) -> Result<()> {
        self.buffer.push(doc);
        let oldest = *self.oldest.get_or_insert_with(Instant::now);
        if self.buffer.len() >= self.config.batch_size
            || oldest.elapsed() >= self.config.flush_interval
        {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.oldest = None;
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len();
        self.written += self.store.insert_many(self.model, batch).await?;
        self.flushes += 1;
        debug!(model = %self.model, count, "Flushed batch");
        Ok(())
    }

    /// Write everything still buffered and return the total written
    pub async fn drain(mut self) -> Result<usize> {
        self.flush().await?;
        Ok(self.written)
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            warn!(
                model = %self.model,
                pending = self.buffer.len(),
                "Batch writer dropped without drain, buffered documents lost"
            );
        }
    }
}
