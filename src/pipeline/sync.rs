//! Sync stage: tight-cadence refresh of open games
//!
//! Refetches only the dates that still hold SCHEDULED or LIVE games
//! inside the rolling window, capped per invocation so a busy slate never
//! turns one call into a backfill. A game seen crossing into FINAL is
//! enqueued right here, not left for the next finalize pass.

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::domain::{League, StageCounts};
use crate::pipeline::{persist_events, StageContext};

pub async fn run_sync(ctx: &StageContext, leagues: &[League]) -> (StageCounts, Vec<String>) {
    let mut counts = StageCounts::default();
    let mut errors = Vec::new();

    let now = Utc::now();
    let from = now - Duration::hours(ctx.settings.window_back_hours);
    let to = now + Duration::hours(ctx.settings.window_ahead_hours);
    let cap = ctx.settings.max_games as u64;

    'leagues: for &league in leagues {
        let Some(feed) = ctx.feeds.feed_for(league) else {
            errors.push(format!("no feed configured for {league}"));
            continue;
        };

        let dates = match ctx.store.active_game_dates(league, from, to).await {
            Ok(dates) => dates,
            Err(e) => {
                errors.push(format!("open-game scan failed for {league}: {e}"));
                continue;
            }
        };

        for date in dates {
            if ctx.cancel.is_cancelled() {
                errors.push("run cancelled".to_string());
                break 'leagues;
            }
            if counts.fetched >= cap {
                debug!(league = %league, cap, "sync reached per-call game cap");
                break 'leagues;
            }

            match feed.fetch(league, date).await {
                Ok(events) => {
                    persist_events(ctx, league, feed.provider(), &events, &mut counts, &mut errors)
                        .await;
                }
                Err(e) => {
                    warn!(league = %league, %date, error = %e, "refresh failed, skipping date");
                    errors.push(e.to_string());
                }
            }
        }
    }

    info!(
        fetched = counts.fetched,
        updated = counts.updated,
        enqueued = counts.enqueued,
        errors = errors.len(),
        "sync pass complete"
    );
    (counts, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone};

    use crate::adapters::feed::{MockProviderFeed, RawEvent};
    use crate::adapters::FeedRegistry;
    use crate::pipeline::{CancelFlag, PipelineSettings};
    use crate::settlement::MockSettlementWorker;
    use crate::store::{MockLifecycleStore, UpsertOutcome};

    fn live_event(league: League, id: &str) -> RawEvent {
        RawEvent {
            league,
            external_id: id.to_string(),
            starts_at: Utc.with_ymd_and_hms(2025, 9, 10, 17, 0, 0).unwrap(),
            status_raw: "2H".to_string(),
            home_team: "Home Club".to_string(),
            away_team: "Away Club".to_string(),
            home_score: Some(14),
            away_score: Some(10),
        }
    }

    fn context(feeds: FeedRegistry, store: MockLifecycleStore) -> StageContext {
        StageContext {
            store: Arc::new(store),
            feeds,
            worker: Arc::new(MockSettlementWorker::new()),
            settings: PipelineSettings {
                max_games: 2,
                ..PipelineSettings::default()
            },
            cancel: CancelFlag::new(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_only_active_dates_are_refetched() {
        let mut feed = MockProviderFeed::new();
        feed.expect_provider().return_const("apisports".to_string());
        feed.expect_fetch()
            .times(1)
            .returning(|l, _| Ok(vec![live_event(l, "7")]));

        let mut registry = FeedRegistry::new();
        registry.register(League::Nba, Arc::new(feed));

        let mut store = MockLifecycleStore::new();
        store
            .expect_active_game_dates()
            .times(1)
            .returning(|_, _, _| Ok(vec![date("2025-09-10")]));
        store.expect_upsert_games().returning(|rows| {
            Ok(UpsertOutcome {
                updated: rows.len() as u64,
                ..UpsertOutcome::default()
            })
        });

        let ctx = context(registry, store);
        let (counts, errors) = run_sync(&ctx, &[League::Nba]).await;

        assert!(errors.is_empty());
        assert_eq!(counts.fetched, 1);
        assert_eq!(counts.updated, 1);
    }

    #[tokio::test]
    async fn test_no_open_games_means_no_fetches() {
        let mut feed = MockProviderFeed::new();
        feed.expect_provider().return_const("apisports".to_string());
        feed.expect_fetch().times(0);

        let mut registry = FeedRegistry::new();
        registry.register(League::Mlb, Arc::new(feed));

        let mut store = MockLifecycleStore::new();
        store
            .expect_active_game_dates()
            .returning(|_, _, _| Ok(vec![]));

        let ctx = context(registry, store);
        let (counts, errors) = run_sync(&ctx, &[League::Mlb]).await;

        assert!(errors.is_empty());
        assert_eq!(counts.fetched, 0);
    }

    #[tokio::test]
    async fn test_game_cap_bounds_one_invocation() {
        let mut feed = MockProviderFeed::new();
        feed.expect_provider().return_const("apisports".to_string());
        // Two events per date; the cap of 2 stops after the first date.
        feed.expect_fetch()
            .times(1)
            .returning(|l, _| Ok(vec![live_event(l, "1"), live_event(l, "2")]));

        let mut registry = FeedRegistry::new();
        registry.register(League::Nhl, Arc::new(feed));

        let mut store = MockLifecycleStore::new();
        store.expect_active_game_dates().returning(|_, _, _| {
            Ok(vec![date("2025-09-10"), date("2025-09-11"), date("2025-09-12")])
        });
        store.expect_upsert_games().returning(|rows| {
            Ok(UpsertOutcome {
                updated: rows.len() as u64,
                ..UpsertOutcome::default()
            })
        });

        let ctx = context(registry, store);
        let (counts, _) = run_sync(&ctx, &[League::Nhl]).await;

        assert_eq!(counts.fetched, 2);
    }
}
