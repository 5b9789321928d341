//! Cache keys: scope, ranking and timeframe

use std::fmt;
use std::str::FromStr;

use chrono::Duration;

use crate::types::PrismError;

/// Scope covering every community
pub const ALL_SCOPE: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortBy {
    Hot,
    Trending,
}

impl SortBy {
    /// Content field holding the score
    pub fn field(&self) -> &'static str {
        match self {
            SortBy::Hot => "stats.hot",
            SortBy::Trending => "stats.trending",
        }
    }
}

impl FromStr for SortBy {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" | "popular" => Ok(SortBy::Hot),
            "trending" => Ok(SortBy::Trending),
            other => Err(PrismError::Validation(format!("unknown ranking {}", other))),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortBy::Hot => "hot",
            SortBy::Trending => "trending",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    Day,
    Week,
    Month,
    All,
}

impl Timeframe {
    /// Window length, `None` for all time
    pub fn window(&self) -> Option<Duration> {
        match self {
            Timeframe::Day => Some(Duration::days(1)),
            Timeframe::Week => Some(Duration::weeks(1)),
            Timeframe::Month => Some(Duration::days(30)),
            Timeframe::All => None,
        }
    }
}

impl FromStr for Timeframe {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Timeframe::Day),
            "week" => Ok(Timeframe::Week),
            "month" => Ok(Timeframe::Month),
            "all" | "WilsonHot" | "WilsonTrending" => Ok(Timeframe::All),
            other => Err(PrismError::Validation(format!("unknown timeframe {}", other))),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Timeframe::Day => "day",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::All => "all",
        })
    }
}

/// One ranked list maintained by the cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: String,
    pub sort_by: SortBy,
    pub timeframe: Timeframe,
}

impl CacheKey {
    pub fn new(scope: impl Into<String>, sort_by: SortBy, timeframe: Timeframe) -> Self {
        Self {
            scope: scope.into(),
            sort_by,
            timeframe,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.sort_by, self.timeframe)
    }
}

/// Parse a comma separated timeframe list such as `day,week,all`
pub fn parse_timeframes(value: &str) -> Result<Vec<Timeframe>, PrismError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Timeframe::from_str)
        .collect()
}
