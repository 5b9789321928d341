//! Generation-tagged feed cache
//!
//! A background loop recomputes the ranked post id list of every
//! `(scope, sortBy, timeframe)` key on a fixed interval. Each recomputation
//! is a new generation with a random id; a per-key pointer names the newest
//! one. Superseded generations stay readable for a TTL so clients paging
//! through them keep a stable list, then they are evicted.
//!
//! Paging from an evicted generation at offset 0 falls back to the newest
//! generation; any later offset is a stale cursor.

pub mod key;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bson::{doc, oid::ObjectId, Bson, Document};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{FindOptions, Model, SharedStore};
use crate::types::{PrismError, Result};

pub use key::{parse_timeframes, CacheKey, SortBy, Timeframe, ALL_SCOPE};

#[derive(Debug, Clone)]
pub struct FeedCacheConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// How long a superseded generation remains readable
    pub ttl: Duration,
    /// Next-cursors point at the newest generation instead of the one that
    /// served the page
    pub hop_to_newest: bool,
    pub timeframes: Vec<Timeframe>,
}

impl Default for FeedCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            ttl: Duration::from_secs(600),
            hop_to_newest: true,
            timeframes: vec![Timeframe::Day, Timeframe::Week, Timeframe::Month, Timeframe::All],
        }
    }
}

impl FeedCacheConfig {
    pub fn from_args(args: &crate::config::Args) -> Result<Self> {
        Ok(Self {
            enabled: args.feed_cache_enabled,
            interval: Duration::from_secs(args.feed_cache_interval_secs),
            ttl: Duration::from_secs(args.feed_cache_ttl_secs),
            hop_to_newest: args.feed_cache_hop_to_newest,
            timeframes: parse_timeframes(&args.feed_cache_timeframes)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefreshState {
    Idle = 0,
    Refreshing = 1,
}

impl RefreshState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Refreshing,
            _ => Self::Idle,
        }
    }
}

/// Position inside a generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCursor {
    pub generation: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachePage {
    pub ids: Vec<ObjectId>,
    pub next: Option<CacheCursor>,
}

struct Generation {
    key: CacheKey,
    ids: Vec<ObjectId>,
    superseded_at: Option<Instant>,
}

pub struct FeedCache {
    store: SharedStore,
    config: FeedCacheConfig,
    generations: DashMap<String, Generation>,
    newest: DashMap<CacheKey, String>,
    state: AtomicU8,
}

impl FeedCache {
    pub fn new(store: SharedStore, config: FeedCacheConfig) -> Self {
        Self {
            store,
            config,
            generations: DashMap::new(),
            newest: DashMap::new(),
            state: AtomicU8::new(RefreshState::Idle as u8),
        }
    }

    pub fn config(&self) -> &FeedCacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn state(&self) -> RefreshState {
        RefreshState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of generations currently readable
    pub fn generation_count(&self) -> usize {
        self.generations.len()
    }

    pub fn newest_generation(&self, key: &CacheKey) -> Option<String> {
        self.newest.get(key).map(|g| g.value().clone())
    }

    /// One page of ranked ids for `key`
    pub fn get_page(
        &self,
        key: &CacheKey,
        cursor: Option<&CacheCursor>,
        limit: usize,
    ) -> Result<CachePage> {
        if !self.config.enabled {
            return Err(PrismError::FeatureDisabled("feed cache is disabled".into()));
        }

        let (generation_id, offset) = match cursor {
            Some(cursor) if self.generations.contains_key(&cursor.generation) => {
                (Some(cursor.generation.clone()), cursor.offset)
            }
            Some(cursor) if cursor.offset > 0 => {
                return Err(PrismError::StaleCursor(format!(
                    "generation {} is no longer available",
                    cursor.generation
                )));
            }
            _ => (self.newest_generation(key), 0),
        };
        let Some(generation_id) = generation_id else {
            return Ok(CachePage {
                ids: Vec::new(),
                next: None,
            });
        };

        let Some(generation) = self.generations.get(&generation_id) else {
            return Err(PrismError::StaleCursor(format!(
                "generation {} is no longer available",
                generation_id
            )));
        };
        if generation.key != *key {
            return Err(PrismError::Validation(format!(
                "sequence key belongs to {}, not {}",
                generation.key, key
            )));
        }

        let start = offset.min(generation.ids.len());
        let end = start.saturating_add(limit).min(generation.ids.len());
        let ids = generation.ids[start..end].to_vec();
        let total = generation.ids.len();
        drop(generation);

        let next = (end < total).then(|| {
            let generation = if self.config.hop_to_newest {
                self.newest_generation(key).unwrap_or(generation_id.clone())
            } else {
                generation_id.clone()
            };
            CacheCursor {
                generation,
                offset: end,
            }
        });
        Ok(CachePage { ids, next })
    }

    /// Recompute every key once; `None` if a refresh was already running
    pub async fn refresh(&self) -> Result<Option<usize>> {
        if self
            .state
            .compare_exchange(
                RefreshState::Idle as u8,
                RefreshState::Refreshing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!("Feed cache refresh already running, tick skipped");
            return Ok(None);
        }
        let result = self.refresh_all().await;
        self.state.store(RefreshState::Idle as u8, Ordering::Release);
        result.map(Some)
    }

    async fn refresh_all(&self) -> Result<usize> {
        let started = Instant::now();
        let mut scopes = vec![ALL_SCOPE.to_string()];
        for community in self
            .store
            .distinct(Model::Post, "communityId", Document::new())
            .await?
        {
            if let Bson::String(community) = community {
                if community != ALL_SCOPE {
                    scopes.push(community);
                }
            }
        }

        let mut keys = 0;
        for scope in &scopes {
            for sort_by in [SortBy::Hot, SortBy::Trending] {
                for timeframe in &self.config.timeframes {
                    let key = CacheKey::new(scope.clone(), sort_by, *timeframe);
                    let ids = self.rank(&key).await?;
                    self.publish(key, ids);
                    keys += 1;
                }
            }
        }
        let evicted = self.evict_expired();

        debug!(
            keys,
            evicted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Feed cache refreshed"
        );
        Ok(keys)
    }

    async fn rank(&self, key: &CacheKey) -> Result<Vec<ObjectId>> {
        let mut filter = doc! { "repost.isRepost": { "$ne": true } };
        if key.scope != ALL_SCOPE {
            filter.insert("communityId", key.scope.as_str());
        }
        if let Some(window) = key.timeframe.window() {
            let since = bson::DateTime::from_chrono(Utc::now() - window);
            filter.insert("meta.time", doc! { "$gte": since });
        }
        let mut sort = Document::new();
        sort.insert(key.sort_by.field(), -1);
        sort.insert("_id", -1);
        let docs = self
            .store
            .find(Model::Post, filter, FindOptions::sorted(sort))
            .await?;
        Ok(docs
            .iter()
            .filter_map(|d| d.get_object_id("_id").ok())
            .collect())
    }

    /// Install a new generation as the newest of its key
    fn publish(&self, key: CacheKey, ids: Vec<ObjectId>) -> String {
        let id = Uuid::new_v4().to_string();
        self.generations.insert(
            id.clone(),
            Generation {
                key: key.clone(),
                ids,
                superseded_at: None,
            },
        );
        if let Some(previous) = self.newest.insert(key, id.clone()) {
            if let Some(mut old) = self.generations.get_mut(&previous) {
                old.superseded_at = Some(Instant::now());
            }
        }
        id
    }

    /// Drop superseded generations older than the TTL
    fn evict_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let before = self.generations.len();
        self.generations.retain(|_, generation| match generation.superseded_at {
            Some(at) => at.elapsed() < ttl,
            None => true,
        });
        before - self.generations.len()
    }

    /// Periodic refresh until shutdown; a failed refresh is fatal
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        if !self.config.enabled {
            info!("Feed cache disabled, ranked feeds unavailable");
            let _ = shutdown.recv().await;
            return Ok(());
        }
        info!(
            interval_secs = self.config.interval.as_secs(),
            ttl_secs = self.config.ttl.as_secs(),
            hop_to_newest = self.config.hop_to_newest,
            "Feed cache started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<Result<Option<usize>>>> = None;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Feed cache shutting down");
                    return Ok(());
                }
                result = join_in_flight(&mut in_flight) => {
                    result.map_err(|e| PrismError::fatal("feed cache refresh", e))?;
                }
                _ = ticker.tick() => {
                    if in_flight.is_some() {
                        warn!("Feed cache refresh still running, tick skipped");
                        continue;
                    }
                    let cache = self.clone();
                    in_flight = Some(tokio::spawn(async move { cache.refresh().await }));
                }
            }
        }
    }
}

/// Wait for the running refresh, or forever when none is running
async fn join_in_flight(task: &mut Option<JoinHandle<Result<Option<usize>>>>) -> Result<Option<usize>> {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    let joined = handle.await;
    *task = None;
    joined.map_err(|e| PrismError::Internal(format!("refresh task failed: {}", e)))?
}
