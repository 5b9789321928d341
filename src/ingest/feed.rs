//! Block feed subscriber
//!
//! Listens on `<prefix>.blocks` and `<prefix>.fork` and forwards decoded
//! events onto the ingestion queue. The queue is bounded, so a slow
//! dispatcher applies backpressure to the subscriber rather than buffering
//! the chain in memory. An undecodable message stops the subscriber: the
//! queue closes and ingestion ends instead of running past a missing block.

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::nats::NatsClient;
use crate::types::{Block, FeedEvent, ForkNotice, PrismError, Result};

#[derive(Debug, Clone)]
pub struct FeedSubjects {
    pub blocks: String,
    pub fork: String,
}

impl FeedSubjects {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            blocks: format!("{}.blocks", prefix),
            fork: format!("{}.fork", prefix),
        }
    }
}

/// Decode a block message
pub fn decode_block(payload: &[u8]) -> Result<FeedEvent> {
    let block: Block = serde_json::from_slice(payload)?;
    Ok(FeedEvent::Block(block))
}

/// Decode a fork notice
pub fn decode_fork(payload: &[u8]) -> Result<FeedEvent> {
    let notice: ForkNotice = serde_json::from_slice(payload)?;
    Ok(FeedEvent::Fork(notice))
}

/// Subscribe to both feed subjects and forward until shutdown or until the
/// ingestion queue is dropped.
pub async fn run_subscriber(
    nats: NatsClient,
    subjects: FeedSubjects,
    queue: mpsc::Sender<FeedEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut blocks = nats.subscribe(&subjects.blocks).await?;
    let mut forks = nats.subscribe(&subjects.fork).await?;
    info!(blocks = %subjects.blocks, fork = %subjects.fork, "Block feed subscribed");

    loop {
        let decoded = tokio::select! {
            _ = shutdown.recv() => {
                info!("Block feed subscriber shutting down");
                return Ok(());
            }
            message = blocks.next() => match message {
                Some(message) => decode_block(&message.payload),
                None => break,
            },
            message = forks.next() => match message {
                Some(message) => decode_fork(&message.payload),
                None => break,
            },
        };

        if !forward(decoded, &queue).await? {
            return Ok(());
        }
    }

    Err(PrismError::Nats("block feed subscription ended".into()))
}

/// Queue one decoded message; `false` once the ingestion queue is closed
async fn forward(decoded: Result<FeedEvent>, queue: &mpsc::Sender<FeedEvent>) -> Result<bool> {
    let event = decoded.map_err(|e| PrismError::fatal("undecodable block feed message", e))?;
    if let FeedEvent::Block(block) = &event {
        debug!(block_num = block.block_num, "Block received");
    }
    if queue.send(event).await.is_err() {
        debug!("Ingestion queue closed");
        return Ok(false);
    }
    Ok(true)
}

/// Spawn the subscriber as a background task
pub fn spawn_subscriber(
    nats: NatsClient,
    subjects: FeedSubjects,
    queue: mpsc::Sender<FeedEvent>,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_subscriber(nats, subjects, queue, shutdown).await {
            error!(error = %e, "Block feed subscriber stopped");
        }
    })
}
