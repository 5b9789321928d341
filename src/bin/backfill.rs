//! prism-backfill - offline maintenance of the Prism read-model
//!
//! Run it while ingestion is stopped; its writes are not recorded in the
//! undo log.
//!
//! Usage:
//!   prism-backfill recount-profiles [--users-file users.txt]
//!   prism-backfill rebuild-hashtags
//!
//! Environment variables:
//!   MONGODB_URI, MONGODB_DB - read-model store
//!   BACKFILL_CONCURRENCY - parallel profile workers (default: 8)
//!   BACKFILL_BATCH_SIZE - documents per write batch (default: 500)
//!   BACKFILL_FLUSH_INTERVAL_MS - longest wait of a buffered write (default: 2000)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prism::{
    backfill::{rebuild_hashtags, read_user_ids, recount_profiles, BackfillConfig, CancelToken},
    config::{BackfillArgs, BackfillCommand},
    db::{MongoClient, MongoStore, SharedStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args = BackfillArgs::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("prism={},info", args.log_level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    args.validate().map_err(anyhow::Error::msg)?;

    let mongo = MongoClient::new(&args.mongo.mongodb_uri, &args.mongo.mongodb_db)
        .await
        .context("connecting to MongoDB")?;
    let store: SharedStore = Arc::new(MongoStore::new(mongo).await?);

    let config = BackfillConfig::from_args(&args);
    let cancel = CancelToken::new();
    cancel.cancel_on_ctrl_c();

    info!(command = ?args.command, concurrency = config.concurrency, "Starting backfill");
    let summary = match &args.command {
        BackfillCommand::RecountProfiles { users_file } => {
            let users = match users_file {
                Some(path) => Some(
                    read_user_ids(path)
                        .await
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };
            recount_profiles(store, &config, users, &cancel).await?
        }
        BackfillCommand::RebuildHashtags => rebuild_hashtags(store, &config, &cancel).await?,
    };
    summary.log();

    if summary.cancelled {
        warn!("Backfill was interrupted, counters may be partial");
        std::process::exit(130);
    }
    Ok(())
}
