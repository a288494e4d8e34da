//! Lifecycle pipeline: discover, sync, finalize, settle
//!
//! Each stage is a batch-and-resume unit of work. The orchestrator owns
//! locks and audit rows; the stage functions own nothing but the work,
//! collecting per-unit failures instead of aborting, so one bad league or
//! date never blocks the rest of a run.

pub mod discover;
pub mod finalize;
pub mod orchestrator;
pub mod prepare;
pub mod settle;
pub mod sync;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;

use crate::adapters::FeedRegistry;
use crate::domain::{League, StageCounts};
use crate::error::StageError;
use crate::settlement::SettlementWorker;
use crate::store::{EnqueueOutcome, LifecycleStore};

pub use orchestrator::Orchestrator;

/// Upsert batch ceiling. Larger fetches are split so a single statement
/// never carries an unbounded payload.
pub const UPSERT_CHUNK: usize = 100;

/// Tunables for the stage runners, loaded from the `[pipeline]` config
/// section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Rolling discovery window: hours behind now.
    pub window_back_hours: i64,
    /// Rolling discovery window: hours ahead of now.
    pub window_ahead_hours: i64,
    /// Per-invocation cap on events refreshed by sync.
    pub max_games: usize,
    /// Per-invocation cap on settlement queue items drained.
    pub max_items: i64,
    /// A LIVE game older than this is swept by finalize.
    pub stale_after_hours: i64,
    /// Stage lock time-to-live.
    pub lock_ttl_secs: i64,
    /// Error list ceiling in responses; the rest is summarized.
    pub max_reported_errors: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_back_hours: 36,
            window_ahead_hours: 36,
            max_games: 200,
            max_items: 50,
            stale_after_hours: 36,
            lock_ttl_secs: 300,
            max_reported_errors: 10,
        }
    }
}

/// Cooperative cancellation checked between units of work (one league,
/// one date). A cancel takes effect within a single unit's latency.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a stage run needs, shared across the four stage functions.
pub struct StageContext {
    pub store: Arc<dyn LifecycleStore>,
    pub feeds: FeedRegistry,
    pub worker: Arc<dyn SettlementWorker>,
    pub settings: PipelineSettings,
    pub cancel: CancelFlag,
}

/// Every UTC calendar date touched by the rolling window around `now`.
pub fn dates_in_window(now: DateTime<Utc>, back_hours: i64, ahead_hours: i64) -> Vec<NaiveDate> {
    let mut day = (now - Duration::hours(back_hours)).date_naive();
    let last = (now + Duration::hours(ahead_hours)).date_naive();
    let mut dates = Vec::new();
    while day <= last {
        dates.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// Shared persist path for discover and sync: normalize, chunk, upsert,
/// and enqueue any game that crossed into FINAL in this batch.
pub(crate) async fn persist_events(
    ctx: &StageContext,
    league: League,
    provider: &str,
    events: &[crate::adapters::RawEvent],
    counts: &mut StageCounts,
    errors: &mut Vec<String>,
) {
    counts.fetched += events.len() as u64;

    let batch = prepare::prepare_upserts(provider, events);
    counts.filtered += batch.filtered;
    counts.unknown_status += batch.unknown_status;

    for chunk in batch.upserts.chunks(UPSERT_CHUNK) {
        match ctx.store.upsert_games(chunk).await {
            Ok(outcome) => {
                counts.inserted += outcome.inserted;
                counts.updated += outcome.updated;
                for game_id in outcome.newly_final {
                    match ctx.store.enqueue_settlement(game_id).await {
                        Ok(EnqueueOutcome::Enqueued) => counts.enqueued += 1,
                        Ok(_) => {}
                        Err(e) => errors.push(format!("enqueue failed for game {game_id}: {e}")),
                    }
                }
            }
            Err(e) => errors.push(
                StageError::Upsert {
                    league,
                    cause: e.to_string(),
                }
                .to_string(),
            ),
        }
    }
}
