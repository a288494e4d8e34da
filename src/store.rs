//! Persistence seam for the pipeline stages
//!
//! Stages talk to this trait, never to SQL. The Postgres adapter is the
//! production implementation; tests run stages against a mock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    Game, GameUpsert, JobLock, JobRun, League, RunType, StageCounts, WinnerSide,
};
use crate::error::Result;

/// Result of one upsert batch. `newly_final` carries the ids of games that
/// crossed into FINAL during this batch so the caller can enqueue them.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub newly_final: Vec<i64>,
}

impl UpsertOutcome {
    pub fn merge(&mut self, other: UpsertOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.newly_final.extend(other.newly_final);
    }
}

/// What happened to an enqueue attempt. Losing the uniqueness race is not
/// an error; the game is on its way to settlement either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    AlreadyQueued,
    AlreadySettled,
}

/// One claimable row from the settlement queue.
#[derive(Debug, Clone)]
pub struct SettlementItem {
    pub id: i64,
    pub game_id: i64,
    pub league: League,
    pub external_game_id: String,
    pub provider: String,
    pub outcome: Option<WinnerSide>,
}

/// Snapshot served by the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusOverview {
    pub locks: Vec<JobLock>,
    pub latest_runs: Vec<JobRun>,
    pub queued: i64,
}

/// Outcome of a non-blocking lock acquire. When someone else holds the
/// lock, `existing` carries the live holder for reporting.
#[derive(Debug, Clone, Default)]
pub struct LockAttempt {
    pub acquired: bool,
    pub existing: Option<JobLock>,
}

impl LockAttempt {
    pub fn won() -> Self {
        Self {
            acquired: true,
            existing: None,
        }
    }

    pub fn held_by(lock: JobLock) -> Self {
        Self {
            acquired: false,
            existing: Some(lock),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    // ── Games ───────────────────────────────────────────────────

    /// Insert or update a batch of normalized rows. Terminal statuses never
    /// regress: a row already FINAL, POSTPONED or CANCELED ignores updates
    /// that would move it back to SCHEDULED or LIVE.
    async fn upsert_games(&self, rows: &[GameUpsert]) -> Result<UpsertOutcome>;

    /// Distinct UTC dates inside the window that still have open
    /// (SCHEDULED or LIVE) games for the league.
    async fn active_game_dates(
        &self,
        league: League,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<NaiveDate>>;

    /// Games stuck in LIVE whose start time is older than the cutoff.
    async fn lingering_live_games(&self, cutoff: DateTime<Utc>) -> Result<Vec<Game>>;

    /// Force a lingering LIVE game to FINAL. Returns false when the game
    /// already left LIVE by the time the update ran.
    async fn force_final(&self, game_id: i64, winner: Option<WinnerSide>) -> Result<bool>;

    /// FINAL games that never made it into the settlement queue and are
    /// not yet settled. These are repair candidates for the finalize sweep.
    async fn final_unqueued_game_ids(&self) -> Result<Vec<i64>>;

    // ── Settlement queue ────────────────────────────────────────

    /// Enqueue a FINAL game for settlement at most once.
    async fn enqueue_settlement(&self, game_id: i64) -> Result<EnqueueOutcome>;

    /// Oldest queued items, up to `limit`.
    async fn queued_settlements(&self, limit: i64) -> Result<Vec<SettlementItem>>;

    /// Mark a queue item settled and stamp the game's settled_at.
    async fn mark_settled(&self, item_id: i64, game_id: i64) -> Result<()>;

    // ── Job locks ───────────────────────────────────────────────

    /// Try to take the stage lock. A live holder wins the contention and
    /// is reported back; an expired lock is stolen. Errors mean the lock
    /// store is unreachable and the stage must not run.
    async fn acquire_lock(&self, key: &str, owner: &str, ttl_secs: i64) -> Result<LockAttempt>;

    /// Release a lock we hold. A lock stolen after expiry is not ours
    /// anymore and stays untouched.
    async fn release_lock(&self, key: &str, owner: &str) -> Result<()>;

    /// Reap locks past their TTL so crashed runs never pin a stage.
    /// Returns the number of rows removed.
    async fn cleanup_expired_locks(&self) -> Result<u64>;

    // ── Job runs ────────────────────────────────────────────────

    async fn record_run_start(&self, job_name: &str, run_type: RunType) -> Result<Uuid>;

    async fn record_run_finish<'a>(
        &self,
        run_id: Uuid,
        status: &str,
        duration_ms: i64,
        counts: &StageCounts,
        error: Option<&'a str>,
    ) -> Result<()>;

    // ── Status ──────────────────────────────────────────────────

    async fn status_overview(&self) -> Result<StatusOverview>;
}
