//! Provider feed seam
//!
//! One adapter implementation per upstream wire dialect, all emitting the
//! same canonical `RawEvent`. The pipeline only ever sees this trait, so
//! provider quirks stay inside the adapter that owns them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::domain::League;

/// A provider event in canonical shape, before normalization.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub league: League,
    pub external_id: String,
    pub starts_at: DateTime<Utc>,
    pub status_raw: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

/// Typed fetch failure for one (league, date) pair. The caller decides
/// whether to skip and continue; no stage aborts on a single date.
#[derive(Error, Debug, Clone)]
#[error("fetch failed for {league} on {date}: {cause}")]
pub struct FetchError {
    pub league: League,
    pub date: NaiveDate,
    pub cause: String,
}

/// Fetches raw events for one (league, date) pair.
///
/// Guarantees: an empty list (not an error) when the provider reports no
/// events for the date; no persistence side effects.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderFeed: Send + Sync {
    fn provider(&self) -> &str;

    async fn fetch(
        &self,
        league: League,
        date: NaiveDate,
    ) -> std::result::Result<Vec<RawEvent>, FetchError>;
}

/// League-to-adapter lookup built from the per-league config table.
#[derive(Clone, Default)]
pub struct FeedRegistry {
    feeds: HashMap<League, Arc<dyn ProviderFeed>>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, league: League, feed: Arc<dyn ProviderFeed>) {
        self.feeds.insert(league, feed);
    }

    pub fn feed_for(&self, league: League) -> Option<Arc<dyn ProviderFeed>> {
        self.feeds.get(&league).cloned()
    }

    pub fn leagues(&self) -> Vec<League> {
        let mut leagues: Vec<League> = self.feeds.keys().copied().collect();
        leagues.sort_by_key(|l| l.as_str());
        leagues
    }
}
