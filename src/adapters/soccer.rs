//! Soccer-format feed client
//!
//! This dialect keeps event fields flat under a `fixture` object with
//! goals instead of scores. One host serves every competition; the
//! league parameter only selects the season resolver.

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
struct SoccerResponse {
    #[serde(default)]
    response: Vec<SoccerEvent>,
}

#[derive(Debug, Deserialize)]
struct SoccerEvent {
    fixture: SoccerFixture,
    teams: SoccerTeams,
    #[serde(default)]
    goals: Option<SoccerGoals>,
}

#[derive(Debug, Deserialize)]
struct SoccerFixture {
    id: i64,
    date: String,
    status: SoccerStatus,
}

#[derive(Debug, Deserialize)]
struct SoccerStatus {
    #[serde(default)]
    short: Option<String>,
    #[serde(default)]
    long: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SoccerTeams {
    home: SoccerTeam,
    away: SoccerTeam,
}

#[derive(Debug, Deserialize)]
struct SoccerTeam {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SoccerGoals {
    #[serde(default)]
    home: Option<i32>,
    #[serde(default)]
    away: Option<i32>,
}

// ── Client ──────────────────────────────────────────────────────

pub struct SoccerFeed {
    http: reqwest::Client,
    api_key: String,
    limiter: Arc<RateLimiter>,
    base_url_override: Option<String>,
}

impl SoccerFeed {
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

    /// Point the client at a different base URL, mainly for tests.
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
        let data: SoccerResponse = serde_json::from_str(body)?;
        let mut events = Vec::with_capacity(data.response.len());
        for event in &data.response {
            match Self::parse_event(league, event) {
                Some(raw) => events.push(raw),
                None => warn!(
                    league = %league,
                    fixture_id = event.fixture.id,
                    "skipping fixture with unparseable kickoff time"
                ),
            }
        }
        Ok(events)
    }

    fn parse_event(league: League, event: &SoccerEvent) -> Option<RawEvent> {
        let starts_at = DateTime::parse_from_rfc3339(&event.fixture.date)
            .ok()?
            .with_timezone(&Utc);

        let status_raw = event
            .fixture
            .status
            .short
            .clone()
            .or_else(|| event.fixture.status.long.clone())
            .unwrap_or_default();

        let (home_score, away_score) = match &event.goals {
            Some(goals) => (goals.home, goals.away),
            None => (None, None),
        };

        Some(RawEvent {
            league,
            external_id: event.fixture.id.to_string(),
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
impl ProviderFeed for SoccerFeed {
    fn provider(&self) -> &str {
        "apisports"
    }

    async fn fetch(
        &self,
        league: League,
        date: NaiveDate,
    ) -> std::result::Result<Vec<RawEvent>, FetchError> {
        self.limiter.acquire().await;

        let url = format!("{}/fixtures", self.base_url(league));
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

        debug!(league = %league, %date, count = events.len(), "fetched fixtures");
        Ok(events)
    }
}
