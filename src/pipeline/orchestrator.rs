//! Stage coordination: locks, audit rows, cursors, response assembly
//!
//! One orchestrator instance serves every trigger source (scheduler, CLI,
//! admin endpoint). Cross-instance exclusivity lives entirely in the
//! database lock table; nothing here assumes it is the only runner.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::FeedRegistry;
use crate::domain::{
    BatchCursor, JobKind, League, RunReport, RunType, StageCounts, StageReport, TriggerRequest,
};
use crate::error::{MatchdayError, Result};
use crate::pipeline::{
    discover::run_discover, finalize::run_finalize, settle::run_settle, sync::run_sync,
    CancelFlag, PipelineSettings, StageContext,
};
use crate::settlement::SettlementWorker;
use crate::store::LifecycleStore;

pub struct Orchestrator {
    ctx: StageContext,
    instance_id: String,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        feeds: FeedRegistry,
        worker: Arc<dyn SettlementWorker>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ctx: StageContext {
                store,
                feeds,
                worker,
                settings,
                cancel: CancelFlag::new(),
            },
            instance_id: format!("matchday-{}", Uuid::new_v4()),
        }
    }

    /// Handle for signal wiring; cancelling stops runs between units.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.ctx.cancel.clone()
    }

    pub fn store(&self) -> Arc<dyn LifecycleStore> {
        self.ctx.store.clone()
    }

    /// Entry point for every trigger source. Fatal problems (bad cursor,
    /// unknown league, unreachable lock store) return Err; per-unit
    /// failures come back inside the report with success still true.
    pub async fn trigger(&self, req: TriggerRequest) -> Result<RunReport> {
        let started = Instant::now();
        let leagues = self.resolve_leagues(req.leagues.as_deref())?;

        info!(job = %req.job, run_type = req.run_type.as_str(), "pipeline trigger");

        // Reap stale locks left behind by crashed runs; acquire can also
        // steal an expired lock, so a failure here only costs visibility.
        match self.ctx.store.cleanup_expired_locks().await {
            Ok(reaped) if reaped > 0 => info!(reaped, "reaped expired stage locks"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "expired-lock cleanup failed"),
        }

        match req.job {
            JobKind::Full => {
                if req.cursor.is_some() {
                    return Err(MatchdayError::InvalidCursor(
                        "'full' runs every stage and does not accept a cursor".to_string(),
                    ));
                }

                let mut results = serde_json::Map::new();
                let mut errors = Vec::new();
                let mut all_skipped = true;

                for stage in JobKind::STAGES {
                    let report = self
                        .run_stage(stage, &leagues, None, req.run_type, true)
                        .await?;
                    all_skipped &= report.skipped;
                    results.insert(
                        stage.as_str().to_string(),
                        serde_json::to_value(report.counts)?,
                    );
                    errors.extend(report.errors);
                    if self.ctx.cancel.is_cancelled() {
                        break;
                    }
                }

                self.cap_errors(&mut errors);
                Ok(RunReport {
                    success: true,
                    job: JobKind::Full,
                    duration_ms: started.elapsed().as_millis() as u64,
                    skipped: all_skipped,
                    results: Value::Object(results),
                    errors,
                    has_more: false,
                    next_cursor: None,
                })
            }
            job => {
                let report = self
                    .run_stage(job, &leagues, req.cursor, req.run_type, false)
                    .await?;
                let mut errors = report.errors;
                self.cap_errors(&mut errors);
                Ok(RunReport {
                    success: true,
                    job,
                    duration_ms: started.elapsed().as_millis() as u64,
                    skipped: report.skipped,
                    results: serde_json::to_value(report.counts)?,
                    errors,
                    has_more: report.has_more,
                    next_cursor: report.next_cursor,
                })
            }
        }
    }

    fn resolve_leagues(&self, requested: Option<&[String]>) -> Result<Vec<League>> {
        match requested {
            None => Ok(self.ctx.feeds.leagues()),
            Some(names) => names
                .iter()
                .map(|name| {
                    let league = League::try_from(name.as_str())
                        .map_err(|_| MatchdayError::UnknownLeague(name.clone()))?;
                    if self.ctx.feeds.feed_for(league).is_none() {
                        return Err(MatchdayError::UnknownLeague(format!(
                            "{league} has no configured feed"
                        )));
                    }
                    Ok(league)
                })
                .collect(),
        }
    }

    /// `all_leagues` disables cursor batching for discover/sync: the full
    /// composite mode runs the whole league list under one lock hold
    /// instead of handing a resume cursor back to the caller.
    async fn run_stage(
        &self,
        job: JobKind,
        leagues: &[League],
        cursor: Option<BatchCursor>,
        run_type: RunType,
        all_leagues: bool,
    ) -> Result<StageReport> {
        let cursor = match job {
            JobKind::Discover | JobKind::Sync if all_leagues => None,
            JobKind::Discover | JobKind::Sync => {
                let cursor = cursor.unwrap_or_else(|| BatchCursor::start(job));
                cursor
                    .validate(job, leagues.len())
                    .map_err(MatchdayError::InvalidCursor)?;
                Some(cursor)
            }
            JobKind::Finalize | JobKind::Settle => {
                if cursor.is_some() {
                    return Err(MatchdayError::InvalidCursor(format!(
                        "'{job}' does not batch by league"
                    )));
                }
                None
            }
            JobKind::Full => {
                return Err(MatchdayError::Internal(
                    "'full' is not a lockable stage".to_string(),
                ))
            }
        };

        let key = job.as_str();
        let attempt = self
            .ctx
            .store
            .acquire_lock(key, &self.instance_id, self.ctx.settings.lock_ttl_secs)
            .await?;
        if !attempt.acquired {
            match attempt.existing {
                Some(lock) => info!(
                    job = %job,
                    holder = %lock.locked_by,
                    expires_at = %lock.expires_at,
                    "stage lock held by another runner, skipping"
                ),
                None => info!(job = %job, "stage lock held by another runner, skipping"),
            }
            return Ok(StageReport::skipped(job));
        }

        let outcome = self.run_locked_stage(job, leagues, cursor, run_type).await;

        if let Err(e) = self.ctx.store.release_lock(key, &self.instance_id).await {
            warn!(job = %job, error = %e, "failed to release stage lock, it will expire");
        }

        let (counts, errors, has_more, next_cursor) = outcome?;
        Ok(StageReport {
            job,
            skipped: false,
            counts,
            errors,
            has_more,
            next_cursor,
        })
    }

    async fn run_locked_stage(
        &self,
        job: JobKind,
        leagues: &[League],
        cursor: Option<BatchCursor>,
        run_type: RunType,
    ) -> Result<(StageCounts, Vec<String>, bool, Option<BatchCursor>)> {
        let run_id = self.ctx.store.record_run_start(job.as_str(), run_type).await?;
        let started = Instant::now();

        let (counts, errors, has_more, next_cursor) = match (job, cursor) {
            (JobKind::Discover, Some(cursor)) => {
                let league = leagues[cursor.league_index];
                let (counts, errors) = run_discover(&self.ctx, &[league]).await;
                let next = cursor.advance(leagues.len());
                (counts, errors, next.is_some(), next)
            }
            (JobKind::Discover, None) => {
                let (counts, errors) = run_discover(&self.ctx, leagues).await;
                (counts, errors, false, None)
            }
            (JobKind::Sync, Some(cursor)) => {
                let league = leagues[cursor.league_index];
                let (counts, errors) = run_sync(&self.ctx, &[league]).await;
                let next = cursor.advance(leagues.len());
                (counts, errors, next.is_some(), next)
            }
            (JobKind::Sync, None) => {
                let (counts, errors) = run_sync(&self.ctx, leagues).await;
                (counts, errors, false, None)
            }
            (JobKind::Finalize, _) => {
                let (counts, errors) = run_finalize(&self.ctx).await;
                (counts, errors, false, None)
            }
            (JobKind::Settle, _) => {
                let (counts, errors, has_more) = run_settle(&self.ctx).await;
                (counts, errors, has_more, None)
            }
            _ => {
                return Err(MatchdayError::Internal(format!(
                    "stage dispatch mismatch for '{job}'"
                )))
            }
        };

        let status = if errors.is_empty() { "ok" } else { "error" };
        let joined = (!errors.is_empty()).then(|| errors.join("; "));
        self.ctx
            .store
            .record_run_finish(
                run_id,
                status,
                started.elapsed().as_millis() as i64,
                &counts,
                joined.as_deref(),
            )
            .await?;

        Ok((counts, errors, has_more, next_cursor))
    }

    fn cap_errors(&self, errors: &mut Vec<String>) {
        let cap = self.ctx.settings.max_reported_errors;
        if errors.len() > cap {
            let extra = errors.len() - cap;
            errors.truncate(cap);
            errors.push(format!("... {extra} more errors suppressed"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockall::predicate::*;

    use chrono::{Duration, Utc};

    use crate::adapters::feed::MockProviderFeed;
    use crate::domain::JobLock;
    use crate::settlement::MockSettlementWorker;
    use crate::store::{LockAttempt, MockLifecycleStore};

    fn narrow_settings() -> PipelineSettings {
        PipelineSettings {
            window_back_hours: 0,
            window_ahead_hours: 0,
            ..PipelineSettings::default()
        }
    }

    fn empty_feed() -> Arc<MockProviderFeed> {
        let mut feed = MockProviderFeed::new();
        feed.expect_provider().return_const("apisports".to_string());
        feed.expect_fetch().returning(|_, _| Ok(vec![]));
        Arc::new(feed)
    }

    fn orchestrator(store: MockLifecycleStore, leagues: &[League]) -> Orchestrator {
        let mut registry = FeedRegistry::new();
        for &league in leagues {
            registry.register(league, empty_feed());
        }
        Orchestrator::new(
            Arc::new(store),
            registry,
            Arc::new(MockSettlementWorker::new()),
            narrow_settings(),
        )
    }

    fn request(job: JobKind, cursor: Option<BatchCursor>) -> TriggerRequest {
        TriggerRequest {
            job,
            leagues: None,
            cursor,
            run_type: RunType::Manual,
        }
    }

    #[tokio::test]
    async fn test_lock_contention_reports_skipped_not_failure() {
        let mut store = MockLifecycleStore::new();
        store.expect_cleanup_expired_locks().returning(|| Ok(0));
        store
            .expect_acquire_lock()
            .with(eq("sync"), always(), always())
            .returning(|_, _, _| {
                Ok(LockAttempt::held_by(JobLock {
                    key: "sync".to_string(),
                    locked_by: "matchday-other".to_string(),
                    expires_at: Utc::now() + Duration::minutes(5),
                }))
            });
        store.expect_record_run_start().times(0);
        store.expect_release_lock().times(0);

        let orch = orchestrator(store, &[League::Nba]);
        let report = orch.trigger(request(JobKind::Sync, None)).await.unwrap();

        assert!(report.success);
        assert!(report.skipped);
        assert!(!report.has_more);
    }

    #[tokio::test]
    async fn test_discover_advances_the_cursor_one_league_per_call() {
        let mut store = MockLifecycleStore::new();
        store.expect_cleanup_expired_locks().returning(|| Ok(0));
        store
            .expect_acquire_lock()
            .returning(|_, _, _| Ok(LockAttempt::won()));
        store
            .expect_record_run_start()
            .returning(|_, _| Ok(Uuid::new_v4()));
        store
            .expect_record_run_finish()
            .returning(|_, _, _, _, _| Ok(()));
        store.expect_release_lock().returning(|_, _| Ok(()));

        let orch = orchestrator(store, &[League::Nba, League::Nfl]);

        let first = orch.trigger(request(JobKind::Discover, None)).await.unwrap();
        assert!(first.has_more);
        let next = first.next_cursor.unwrap();
        assert_eq!(next.league_index, 1);

        let second = orch
            .trigger(request(JobKind::Discover, Some(next)))
            .await
            .unwrap();
        assert!(!second.has_more);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_mismatched_cursor_is_rejected_before_any_lock() {
        let mut store = MockLifecycleStore::new();
        store.expect_cleanup_expired_locks().returning(|| Ok(0));
        store.expect_acquire_lock().times(0);

        let orch = orchestrator(store, &[League::Nba]);
        let cursor = BatchCursor::start(JobKind::Sync);
        let result = orch.trigger(request(JobKind::Discover, Some(cursor))).await;

        assert!(matches!(result, Err(MatchdayError::InvalidCursor(_))));
    }

    #[tokio::test]
    async fn test_failed_lock_cleanup_does_not_block_the_stage() {
        let mut store = MockLifecycleStore::new();
        store
            .expect_cleanup_expired_locks()
            .returning(|| Err(MatchdayError::Internal("db hiccup".to_string())));
        store
            .expect_acquire_lock()
            .returning(|_, _, _| Ok(LockAttempt::won()));
        store
            .expect_record_run_start()
            .returning(|_, _| Ok(Uuid::new_v4()));
        store
            .expect_record_run_finish()
            .returning(|_, _, _, _, _| Ok(()));
        store.expect_release_lock().returning(|_, _| Ok(()));
        store
            .expect_lingering_live_games()
            .returning(|_| Ok(vec![]));
        store
            .expect_final_unqueued_game_ids()
            .returning(|| Ok(vec![]));

        let orch = orchestrator(store, &[League::Nba]);
        let report = orch.trigger(request(JobKind::Finalize, None)).await.unwrap();

        assert!(report.success);
        assert!(!report.skipped);
    }

    #[tokio::test]
    async fn test_unknown_league_is_a_hard_failure() {
        let store = MockLifecycleStore::new();
        let orch = orchestrator(store, &[League::Nba]);

        let req = TriggerRequest {
            job: JobKind::Sync,
            leagues: Some(vec!["XFL".to_string()]),
            cursor: None,
            run_type: RunType::Manual,
        };
        let result = orch.trigger(req).await;

        assert!(matches!(result, Err(MatchdayError::UnknownLeague(_))));
    }

    #[tokio::test]
    async fn test_full_mode_runs_every_stage_under_its_own_lock() {
        let mut store = MockLifecycleStore::new();
        store.expect_cleanup_expired_locks().returning(|| Ok(0));
        for key in ["discover", "sync", "finalize", "settle"] {
            store
                .expect_acquire_lock()
                .with(eq(key), always(), always())
                .times(1)
                .returning(|_, _, _| Ok(LockAttempt::won()));
        }
        store
            .expect_record_run_start()
            .times(4)
            .returning(|_, _| Ok(Uuid::new_v4()));
        store
            .expect_record_run_finish()
            .times(4)
            .returning(|_, _, _, _, _| Ok(()));
        store.expect_release_lock().times(4).returning(|_, _| Ok(()));
        store
            .expect_active_game_dates()
            .returning(|_, _, _| Ok(vec![]));
        store
            .expect_lingering_live_games()
            .returning(|_| Ok(vec![]));
        store
            .expect_final_unqueued_game_ids()
            .returning(|| Ok(vec![]));
        store.expect_queued_settlements().returning(|_| Ok(vec![]));

        let orch = orchestrator(store, &[League::Nba]);
        let report = orch.trigger(request(JobKind::Full, None)).await.unwrap();

        assert!(report.success);
        assert!(!report.skipped);
        assert!(report.results.get("discover").is_some());
        assert!(report.results.get("settle").is_some());
    }

    #[tokio::test]
    async fn test_full_mode_discovers_every_league_without_a_cursor() {
        let mut store = MockLifecycleStore::new();
        store.expect_cleanup_expired_locks().returning(|| Ok(0));
        store
            .expect_acquire_lock()
            .returning(|_, _, _| Ok(LockAttempt::won()));
        store
            .expect_record_run_start()
            .returning(|_, _| Ok(Uuid::new_v4()));
        store
            .expect_record_run_finish()
            .returning(|_, _, _, _, _| Ok(()));
        store.expect_release_lock().returning(|_, _| Ok(()));
        store
            .expect_active_game_dates()
            .returning(|_, _, _| Ok(vec![]));
        store
            .expect_lingering_live_games()
            .returning(|_| Ok(vec![]));
        store
            .expect_final_unqueued_game_ids()
            .returning(|| Ok(vec![]));
        store.expect_queued_settlements().returning(|_| Ok(vec![]));

        let mut registry = FeedRegistry::new();
        for league in [League::Nba, League::Nfl] {
            let mut feed = MockProviderFeed::new();
            feed.expect_provider().return_const("apisports".to_string());
            // Narrow window means one date, so one fetch per league.
            feed.expect_fetch().times(1).returning(|_, _| Ok(vec![]));
            registry.register(league, Arc::new(feed));
        }

        let orch = Orchestrator::new(
            Arc::new(store),
            registry,
            Arc::new(MockSettlementWorker::new()),
            narrow_settings(),
        );
        let report = orch.trigger(request(JobKind::Full, None)).await.unwrap();

        assert!(report.success);
        assert!(!report.has_more);
        assert!(report.next_cursor.is_none());
    }
}
