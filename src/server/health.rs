//! Liveness endpoint

use serde::Serialize;

use super::AppState;
use crate::feed_cache::RefreshState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    pub uptime: u64,
    pub last_block: u64,
    pub feed_cache: FeedCacheHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedCacheHealth {
    pub enabled: bool,
    pub state: &'static str,
    pub generations: usize,
}

pub fn build_health_response(state: &AppState) -> HealthResponse {
    let cache = state.api.feed_cache();
    HealthResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        uptime: state.started.elapsed().as_secs(),
        last_block: state.api.waiter().last_block(),
        feed_cache: FeedCacheHealth {
            enabled: cache.is_enabled(),
            state: match cache.state() {
                RefreshState::Idle => "idle",
                RefreshState::Refreshing => "refreshing",
            },
            generations: cache.generation_count(),
        },
    }
}
