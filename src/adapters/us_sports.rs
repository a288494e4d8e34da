//! US-format sports feed client (NFL, NBA, NHL, MLB hosts)
//!
//! This dialect nests event fields under a `game` object with team and
//! score maps alongside it. Each league has its own host; the request and
//! response shapes are otherwise identical across the four leagues.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapters::feed::{FetchError, ProviderFeed, RawEvent};
use crate::adapters::rate_limit::RateLimiter;
use crate::domain::League;
use crate::error::Result;
use crate::leagues::{league_spec, season_for_date};

// ── Wire shapes ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UsResponse {
    #[serde(default)]
    response: Vec<UsEvent>,
}

#[derive(Debug, Deserialize)]
struct UsEvent {
    game: UsGame,
    teams: UsTeams,
    #[serde(default)]
    scores: Option<UsScores>,
}

#[derive(Debug, Deserialize)]
struct UsGame {
    id: i64,
    date: UsDate,
    status: UsStatus,
}

#[derive(Debug, Deserialize)]
struct UsDate {
    start: String,
}

#[derive(Debug, Deserialize)]
struct UsStatus {
    #[serde(default)]
    short: Option<String>,
    #[serde(default)]
    long: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsTeams {
    home: UsTeam,
    away: UsTeam,
}

#[derive(Debug, Deserialize)]
struct UsTeam {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UsScores {
    #[serde(default)]
    home: Option<UsScore>,
    #[serde(default)]
    away: Option<UsScore>,
}

#[derive(Debug, Deserialize)]
struct UsScore {
    #[serde(default)]
    total: Option<i32>,
    #[serde(default)]
    points: Option<i32>,
}

impl UsScore {
    fn value(&self) -> Option<i32> {
        self.total.or(self.points)
    }
}

// ── Client ──────────────────────────────────────────────────────

pub struct UsSportsFeed {
    http: reqwest::Client,
    api_key: String,
    limiter: Arc<RateLimiter>,
    base_url_override: Option<String>,
}

impl UsSportsFeed {
    pub fn new(api_key: impl Into<String>, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            limiter,
            base_url_override: None,
        })
    }

    /// Point every league at one base URL instead of the per-league hosts.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    fn base_url(&self, league: League) -> String {
        match &self.base_url_override {
            Some(base) => base.clone(),
            None => format!("https://{}", league_spec(league).host),
        }
    }

    fn parse_response(league: League, body: &str) -> serde_json::Result<Vec<RawEvent>> {
        let data: UsResponse = serde_json::from_str(body)?;
        let mut events = Vec::with_capacity(data.response.len());
        for event in &data.response {
            match Self::parse_event(league, event) {
                Some(raw) => events.push(raw),
                None => warn!(
                    league = %league,
                    game_id = event.game.id,
                    "skipping event with unparseable start time"
                ),
            }
        }
        Ok(events)
    }

    fn parse_event(league: League, event: &UsEvent) -> Option<RawEvent> {
        let starts_at = DateTime::parse_from_rfc3339(&event.game.date.start)
            .ok()?
            .with_timezone(&Utc);

        let status_raw = event
            .game
            .status
            .short
            .clone()
            .or_else(|| event.game.status.long.clone())
            .unwrap_or_default();

        let (home_score, away_score) = match &event.scores {
            Some(scores) => (
                scores.home.as_ref().and_then(UsScore::value),
                scores.away.as_ref().and_then(UsScore::value),
            ),
            None => (None, None),
        };

        Some(RawEvent {
            league,
            external_id: event.game.id.to_string(),
            starts_at,
            status_raw,
            home_team: event.teams.home.name.clone(),
            away_team: event.teams.away.name.clone(),
            home_score,
            away_score,
        })
    }
}

#[async_trait]
impl ProviderFeed for UsSportsFeed {
    fn provider(&self) -> &str {
        "apisports"
    }

    async fn fetch(
        &self,
        league: League,
        date: NaiveDate,
    ) -> std::result::Result<Vec<RawEvent>, FetchError> {
        self.limiter.acquire().await;

        let url = format!("{}/games", self.base_url(league));
        let season = season_for_date(league, date);
        let fail = |cause: String| FetchError {
            league,
            date,
            cause,
        };

        let resp = self
            .http
            .get(&url)
            .header("x-apisports-key", &self.api_key)
            .query(&[
                ("date", date.format("%Y-%m-%d").to_string()),
                ("season", season.to_string()),
            ])
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?
            .error_for_status()
            .map_err(|e| fail(e.to_string()))?;

        let body = resp.text().await.map_err(|e| fail(e.to_string()))?;
        let events =
            Self::parse_response(league, &body).map_err(|e| fail(format!("bad payload: {e}")))?;

        debug!(league = %league, %date, count = events.len(), "fetched events");
        Ok(events)
    }
}
