//! Time-decayed ranking score
//!
//! `sign(r) * log10(max(|r| / base, 1)) + seconds_since_epoch(created) / decay`

use chrono::{DateTime, Utc};

/// Base and decay of one ranking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreParams {
    pub base: f64,
    pub decay: f64,
}

pub const HOT: ScoreParams = ScoreParams {
    base: 10_000_000.0,
    decay: 10_000.0,
};

pub const TRENDING: ScoreParams = ScoreParams {
    base: 10_000_000.0,
    decay: 480_000.0,
};

pub fn score(r_shares: i64, created_at: DateTime<Utc>, params: ScoreParams) -> f64 {
    let r = r_shares as f64;
    let magnitude = (r.abs() / params.base).max(1.0).log10();
    let seconds = created_at.timestamp() as f64 + f64::from(created_at.timestamp_subsec_millis()) / 1000.0;
    r.signum() * magnitude + seconds / params.decay
}

/// `(hot, trending)` for a content item
pub fn rank(r_shares: i64, created_at: DateTime<Utc>) -> (f64, f64) {
    (
        score(r_shares, created_at, HOT),
        score(r_shares, created_at, TRENDING),
    )
}
