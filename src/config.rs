//! Configuration for Prism
//!
//! CLI arguments and environment variable handling using clap. Every option
//! can also come from the environment or a `.env` file.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::feed_cache::parse_timeframes;

/// Prism - read-model projection service for a social-content blockchain
#[derive(Parser, Debug, Clone)]
#[command(name = "prism")]
#[command(about = "Projects blockchain actions into a queryable document store")]
pub struct Args {
    /// Address the query API listens on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB configuration
    #[command(flatten)]
    pub mongo: MongoArgs,

    /// Keep the read-model in memory instead of MongoDB (development only)
    #[arg(long, env = "MEMORY_STORE", default_value = "false")]
    pub memory_store: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Handlers running longer than this are logged
    #[arg(long, env = "SLOW_HANDLER_MS", default_value = "500")]
    pub slow_handler_ms: u64,

    /// Deepest comment nesting level with its own ordering segment
    #[arg(long, env = "MAX_COMMENT_DEPTH", default_value = "6")]
    pub max_comment_depth: u32,

    /// Undo stacks kept behind the last ingested block
    #[arg(long, env = "UNDO_RETENTION_BLOCKS", default_value = "1000")]
    pub undo_retention_blocks: u64,

    /// Capacity of the queue between the block feed and the dispatcher
    #[arg(long, env = "FEED_QUEUE_SIZE", default_value = "256")]
    pub feed_queue_size: usize,

    /// Maintain ranked hot/trending feeds
    #[arg(long, env = "FEED_CACHE_ENABLED", default_value = "true")]
    pub feed_cache_enabled: bool,

    /// Seconds between feed cache refreshes
    #[arg(long, env = "FEED_CACHE_INTERVAL_SECS", default_value = "60")]
    pub feed_cache_interval_secs: u64,

    /// Seconds a superseded feed generation stays readable
    #[arg(long, env = "FEED_CACHE_TTL_SECS", default_value = "600")]
    pub feed_cache_ttl_secs: u64,

    /// Continue paging on the newest generation instead of the one that
    /// served the previous page
    #[arg(long, env = "FEED_CACHE_HOP_TO_NEWEST", default_value = "true")]
    pub feed_cache_hop_to_newest: bool,

    /// Comma separated timeframes to rank (day, week, month, all)
    #[arg(long, env = "FEED_CACHE_TIMEFRAMES", default_value = "day,week,month,all")]
    pub feed_cache_timeframes: String,

    /// Longest wait of waitForBlock / waitForTransaction in milliseconds
    #[arg(long, env = "WAIT_TIMEOUT_MS", default_value = "10000")]
    pub wait_timeout_ms: u64,

    /// Page size when a query gives no limit
    #[arg(long, env = "PAGE_LIMIT_DEFAULT", default_value = "20")]
    pub page_limit_default: usize,

    /// Largest accepted page size
    #[arg(long, env = "PAGE_LIMIT_MAX", default_value = "100")]
    pub page_limit_max: usize,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// Subject prefix of the block feed (`<prefix>.blocks`, `<prefix>.fork`)
    #[arg(long, env = "FEED_SUBJECT_PREFIX", default_value = "prism.feed")]
    pub feed_subject_prefix: String,
}

/// MongoDB connection configuration
#[derive(Parser, Debug, Clone)]
pub struct MongoArgs {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "prism")]
    pub mongodb_db: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.page_limit_default == 0 || self.page_limit_max == 0 {
            return Err("PAGE_LIMIT_DEFAULT and PAGE_LIMIT_MAX must be positive".to_string());
        }
        if self.page_limit_default > self.page_limit_max {
            return Err("PAGE_LIMIT_DEFAULT must not exceed PAGE_LIMIT_MAX".to_string());
        }
        if self.max_comment_depth == 0 {
            return Err("MAX_COMMENT_DEPTH must be at least 1".to_string());
        }
        if self.feed_queue_size == 0 {
            return Err("FEED_QUEUE_SIZE must be positive".to_string());
        }
        if self.feed_cache_enabled {
            if self.feed_cache_interval_secs == 0 {
                return Err("FEED_CACHE_INTERVAL_SECS must be positive".to_string());
            }
            match parse_timeframes(&self.feed_cache_timeframes) {
                Ok(timeframes) if timeframes.is_empty() => {
                    return Err("FEED_CACHE_TIMEFRAMES must name at least one timeframe".to_string())
                }
                Ok(_) => {}
                Err(e) => return Err(format!("FEED_CACHE_TIMEFRAMES: {}", e)),
            }
        }
        Ok(())
    }
}

/// prism-backfill - offline maintenance of the read-model
#[derive(Parser, Debug, Clone)]
#[command(name = "prism-backfill")]
#[command(about = "Recompute derived counters of the Prism read-model")]
pub struct BackfillArgs {
    #[command(subcommand)]
    pub command: BackfillCommand,

    /// MongoDB configuration
    #[command(flatten)]
    pub mongo: MongoArgs,

    /// Parallel workers for per-profile recounts
    #[arg(long, env = "BACKFILL_CONCURRENCY", default_value = "8")]
    pub concurrency: usize,

    /// Buffered writes flushed at once
    #[arg(long, env = "BACKFILL_BATCH_SIZE", default_value = "500")]
    pub batch_size: usize,

    /// Longest time a buffered write waits for a flush, in milliseconds
    #[arg(long, env = "BACKFILL_FLUSH_INTERVAL_MS", default_value = "2000")]
    pub flush_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum BackfillCommand {
    /// Recompute posts/comments counters of every profile
    RecountProfiles {
        /// Only recount the user ids listed in this file, one per line
        #[arg(long)]
        users_file: Option<PathBuf>,
    },
    /// Rebuild per-community hashtag counters from posts
    RebuildHashtags,
}

impl BackfillArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("BACKFILL_CONCURRENCY must be positive".to_string());
        }
        if self.batch_size == 0 {
            return Err("BACKFILL_BATCH_SIZE must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let args = Args::parse_from(["prism"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.max_comment_depth, 6);
        assert_eq!(args.nats.feed_subject_prefix, "prism.feed");
    }

    #[test]
    fn test_rejects_inverted_page_limits() {
        let args = Args::parse_from(["prism", "--page-limit-default", "500"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_timeframe() {
        let args = Args::parse_from(["prism", "--feed-cache-timeframes", "day,decade"]);
        assert!(args.validate().unwrap_err().contains("FEED_CACHE_TIMEFRAMES"));
    }

    #[test]
    fn test_backfill_subcommand() {
        let args = BackfillArgs::parse_from(["prism-backfill", "--concurrency", "2", "rebuild-hashtags"]);
        assert_eq!(args.command, BackfillCommand::RebuildHashtags);
        assert_eq!(args.concurrency, 2);
    }
}
