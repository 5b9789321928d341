//! Prism - read-model projection service
//!
//! Runs the block ingestion, the feed cache refresher and the query API in
//! one process. A fatal ingestion error exits with status 1; a reverted fork
//! exits with status 0 so the supervisor restarts ingestion from the rewound
//! position.

use clap::Parser;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use prism::{
    api::{ApiConfig, QueryApi},
    config::Args,
    db::{MemoryStore, MongoClient, MongoStore, SharedStore},
    feed_cache::{FeedCache, FeedCacheConfig},
    ingest::{
        spawn_subscriber, BlockWaiter, Dispatcher, DispatcherConfig, FeedSubjects, IngestOutcome,
        Router, RouterConfig,
    },
    nats::NatsClient,
    ordering::NestedOrdering,
    server::{self, AppState},
    PrismError,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("prism={},info", args.log_level)));
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Prism - chain read-model projection");
    info!("======================================");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"));
    info!("Listen: {}", args.listen);
    info!("Store: {}", if args.memory_store { "in-memory (DEVELOPMENT)" } else { "MongoDB" });
    info!("NATS: {} ({}.*)", args.nats.nats_url, args.nats.feed_subject_prefix);
    info!("Feed cache: {}", if args.feed_cache_enabled { "enabled" } else { "disabled" });
    info!("Undo retention: {} blocks", args.undo_retention_blocks);
    info!("======================================");

    let store: SharedStore = if args.memory_store {
        warn!("Using the in-memory store, nothing survives a restart");
        Arc::new(MemoryStore::new())
    } else {
        let connected = match MongoClient::new(&args.mongo.mongodb_uri, &args.mongo.mongodb_db).await {
            Ok(client) => MongoStore::new(client).await,
            Err(e) => Err(e),
        };
        match connected {
            Ok(store) => {
                info!("MongoDB connected successfully");
                Arc::new(store)
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let feed_cache_config = match FeedCacheConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let nats = match NatsClient::new(&args.nats, "prism").await {
        Ok(client) => client,
        Err(e) => {
            error!("NATS connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let waiter = Arc::new(BlockWaiter::default());

    let router = Router::new(
        store.clone(),
        RouterConfig::from_args(&args),
        NestedOrdering::new(args.max_comment_depth),
    );
    let dispatcher = Dispatcher::new(
        store.clone(),
        router,
        Arc::clone(&waiter),
        DispatcherConfig::from_args(&args),
    )
    .await?;

    let feed_cache = Arc::new(FeedCache::new(store.clone(), feed_cache_config));
    let mut cache_task = tokio::spawn(Arc::clone(&feed_cache).run(shutdown_tx.subscribe()));

    let (queue_tx, queue_rx) = mpsc::channel(args.feed_queue_size);
    let _subscriber = spawn_subscriber(
        nats,
        FeedSubjects::with_prefix(&args.nats.feed_subject_prefix),
        queue_tx,
        shutdown_tx.subscribe(),
    );

    let api = QueryApi::new(store, feed_cache, waiter, ApiConfig::from_args(&args));
    let state = Arc::new(AppState::new(api, args.listen));
    let mut server_task = tokio::spawn(server::run(state, shutdown_tx.subscribe()));

    let mut ingest = tokio::spawn(dispatcher.run(queue_rx, shutdown_tx.subscribe()));
    let mut ingest_finished = false;

    let mut exit_code = tokio::select! {
        joined = &mut ingest => {
            ingest_finished = true;
            ingest_exit_code(joined)
        }
        joined = &mut server_task => {
            log_task_exit("Query API", joined);
            1
        }
        joined = &mut cache_task => {
            log_task_exit("Feed cache", joined);
            1
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            0
        }
    };

    let _ = shutdown_tx.send(());
    if !ingest_finished {
        // the dispatcher stops between blocks, never inside one
        if ingest_exit_code(ingest.await) != 0 {
            exit_code = 1;
        }
    }

    info!("Prism stopped");
    std::process::exit(exit_code);
}

fn ingest_exit_code(joined: Result<Result<IngestOutcome, PrismError>, JoinError>) -> i32 {
    match joined {
        Ok(Ok(IngestOutcome::Reverted { rewind_to, summary })) => {
            warn!(
                rewind_to,
                blocks = summary.blocks,
                entries = summary.entries,
                "Fork reverted, exiting for a restart from the rewound position"
            );
            0
        }
        Ok(Ok(IngestOutcome::Stopped)) => 0,
        Ok(Ok(IngestOutcome::FeedClosed)) => {
            error!("Block feed closed");
            1
        }
        Ok(Err(e)) => {
            error!("Ingestion failed: {}", e);
            1
        }
        Err(e) => {
            error!("Ingestion task panicked: {}", e);
            1
        }
    }
}

fn log_task_exit(name: &str, joined: Result<Result<(), PrismError>, JoinError>) {
    match joined {
        Ok(Ok(())) => error!("{} stopped unexpectedly", name),
        Ok(Err(e)) => error!("{} failed: {}", name, e),
        Err(e) => error!("{} task panicked: {}", name, e),
    }
}
