//! Discover stage: rolling-window ingestion
//!
//! Fetches every date in the window for the given leagues, normalizes and
//! upserts what comes back. A failed date is skipped and reported; the
//! remaining dates and leagues still run.

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::{League, StageCounts};
use crate::pipeline::{dates_in_window, persist_events, StageContext};

pub async fn run_discover(ctx: &StageContext, leagues: &[League]) -> (StageCounts, Vec<String>) {
    let mut counts = StageCounts::default();
    let mut errors = Vec::new();

    let dates = dates_in_window(
        Utc::now(),
        ctx.settings.window_back_hours,
        ctx.settings.window_ahead_hours,
    );

    'leagues: for &league in leagues {
        let Some(feed) = ctx.feeds.feed_for(league) else {
            errors.push(format!("no feed configured for {league}"));
            continue;
        };

        for &date in &dates {
            if ctx.cancel.is_cancelled() {
                errors.push("run cancelled".to_string());
                break 'leagues;
            }

            match feed.fetch(league, date).await {
                Ok(events) => {
                    persist_events(ctx, league, feed.provider(), &events, &mut counts, &mut errors)
                        .await;
                }
                Err(e) => {
                    warn!(league = %league, %date, error = %e, "fetch failed, skipping date");
                    errors.push(e.to_string());
                }
            }
        }
    }

    info!(
        fetched = counts.fetched,
        inserted = counts.inserted,
        updated = counts.updated,
        enqueued = counts.enqueued,
        errors = errors.len(),
        "discover pass complete"
    );
    (counts, errors)
}
