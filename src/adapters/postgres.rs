//! PostgreSQL implementation of the lifecycle store
//!
//! All writes that guard an invariant do it in SQL, not in Rust: the
//! status non-regression filter lives on the upsert, the at-most-once
//! settlement hand-off on the queue's uniqueness constraint, and lock
//! stealing on a conditional conflict update. Concurrent runners then
//! converge no matter who executes first.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use async_trait::async_trait;

use crate::domain::{
    Game, GameStatus, GameUpsert, JobLock, JobRun, League, RunType, StageCounts, WinnerSide,
};
use crate::error::{MatchdayError, Result};
use crate::store::{
    EnqueueOutcome, LifecycleStore, LockAttempt, SettlementItem, StatusOverview, UpsertOutcome,
};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn game_from_row(row: &PgRow) -> Result<Game> {
    let league = League::try_from(row.get::<String, _>("league").as_str())
        .map_err(MatchdayError::Internal)?;
    let status_norm = GameStatus::try_from(row.get::<String, _>("status_norm").as_str())
        .map_err(MatchdayError::Internal)?;
    let winner_side = row
        .get::<Option<String>, _>("winner_side")
        .map(|s| WinnerSide::try_from(s.as_str()))
        .transpose()
        .map_err(MatchdayError::Internal)?;

    Ok(Game {
        id: row.get("id"),
        league,
        external_game_id: row.get("external_game_id"),
        provider: row.get("provider"),
        season: row.get("season"),
        starts_at: row.get("starts_at"),
        status_raw: row.get("status_raw"),
        status_norm,
        home_team: row.get("home_team"),
        away_team: row.get("away_team"),
        home_score: row.get("home_score"),
        away_score: row.get("away_score"),
        winner_side,
        finalized_at: row.get("finalized_at"),
        settled_at: row.get("settled_at"),
        last_synced_at: row.get("last_synced_at"),
    })
}

#[async_trait]
impl LifecycleStore for PostgresStore {
    // ==================== Games ====================

    async fn upsert_games(&self, rows: &[GameUpsert]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        if rows.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.pool.begin().await?;

        for game in rows {
            let previous: Option<String> = sqlx::query_scalar(
                r#"
                SELECT status_norm FROM games
                WHERE league = $1 AND external_game_id = $2
                "#,
            )
            .bind(game.league.as_str())
            .bind(&game.external_game_id)
            .fetch_optional(&mut *tx)
            .await?;

            let row = sqlx::query(
                r#"
                INSERT INTO games (
                    league, external_game_id, provider, season, starts_at,
                    status_raw, status_norm, home_team, away_team,
                    home_score, away_score, winner_side,
                    finalized_at, last_synced_at
                )
                VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    CASE WHEN $7 = 'FINAL' THEN now() END, now()
                )
                ON CONFLICT (league, external_game_id) DO UPDATE SET
                    provider = EXCLUDED.provider,
                    season = EXCLUDED.season,
                    starts_at = EXCLUDED.starts_at,
                    status_raw = EXCLUDED.status_raw,
                    status_norm = EXCLUDED.status_norm,
                    home_team = EXCLUDED.home_team,
                    away_team = EXCLUDED.away_team,
                    home_score = EXCLUDED.home_score,
                    away_score = EXCLUDED.away_score,
                    winner_side = COALESCE(EXCLUDED.winner_side, games.winner_side),
                    finalized_at = COALESCE(games.finalized_at, EXCLUDED.finalized_at),
                    last_synced_at = now()
                WHERE games.status_norm NOT IN ('FINAL', 'POSTPONED', 'CANCELED')
                   OR EXCLUDED.status_norm IN ('FINAL', 'POSTPONED', 'CANCELED')
                RETURNING id, status_norm
                "#,
            )
            .bind(game.league.as_str())
            .bind(&game.external_game_id)
            .bind(&game.provider)
            .bind(game.season)
            .bind(game.starts_at)
            .bind(&game.status_raw)
            .bind(game.status_norm.as_str())
            .bind(&game.home_team)
            .bind(&game.away_team)
            .bind(game.home_score)
            .bind(game.away_score)
            .bind(game.winner_side.map(|w| w.as_str()))
            .fetch_optional(&mut *tx)
            .await?;

            match row {
                Some(r) => {
                    if previous.is_some() {
                        outcome.updated += 1;
                    } else {
                        outcome.inserted += 1;
                    }
                    let stored: String = r.get("status_norm");
                    if stored == "FINAL" && previous.as_deref() != Some("FINAL") {
                        outcome.newly_final.push(r.get("id"));
                    }
                }
                None => debug!(
                    league = %game.league,
                    external_game_id = %game.external_game_id,
                    incoming = game.status_norm.as_str(),
                    "skipping update that would regress a terminal status"
                ),
            }
        }

        tx.commit().await?;

        debug!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            newly_final = outcome.newly_final.len(),
            "upserted game batch"
        );
        Ok(outcome)
    }

    async fn active_game_dates(
        &self,
        league: League,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<NaiveDate>> {
        let dates: Vec<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT (starts_at AT TIME ZONE 'UTC')::date AS day
            FROM games
            WHERE league = $1
              AND status_norm IN ('SCHEDULED', 'LIVE')
              AND starts_at >= $2 AND starts_at <= $3
            ORDER BY day
            "#,
        )
        .bind(league.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates)
    }

    async fn lingering_live_games(&self, cutoff: DateTime<Utc>) -> Result<Vec<Game>> {
        let rows = sqlx::query(
            r#"
            SELECT id, league, external_game_id, provider, season, starts_at,
                   status_raw, status_norm, home_team, away_team,
                   home_score, away_score, winner_side,
                   finalized_at, settled_at, last_synced_at
            FROM games
            WHERE status_norm = 'LIVE' AND starts_at < $1
            ORDER BY starts_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(game_from_row).collect()
    }

    async fn force_final(&self, game_id: i64, winner: Option<WinnerSide>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE games SET
                status_norm = 'FINAL',
                winner_side = COALESCE($2, winner_side),
                finalized_at = COALESCE(finalized_at, now()),
                last_synced_at = now()
            WHERE id = $1 AND status_norm = 'LIVE'
            "#,
        )
        .bind(game_id)
        .bind(winner.map(|w| w.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn final_unqueued_game_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT g.id
            FROM games g
            LEFT JOIN settlement_queue q ON q.game_id = g.id
            WHERE g.status_norm = 'FINAL'
              AND g.settled_at IS NULL
              AND q.id IS NULL
            ORDER BY g.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    // ==================== Settlement queue ====================

    async fn enqueue_settlement(&self, game_id: i64) -> Result<EnqueueOutcome> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO settlement_queue (game_id, league, external_game_id, provider, outcome)
            SELECT id, league, external_game_id, provider, winner_side
            FROM games
            WHERE id = $1 AND status_norm = 'FINAL' AND settled_at IS NULL
            ON CONFLICT (game_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            debug!(game_id, "enqueued game for settlement");
            return Ok(EnqueueOutcome::Enqueued);
        }

        let settled_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT settled_at FROM games WHERE id = $1")
                .bind(game_id)
                .fetch_one(&self.pool)
                .await?;

        if settled_at.is_some() {
            Ok(EnqueueOutcome::AlreadySettled)
        } else {
            Ok(EnqueueOutcome::AlreadyQueued)
        }
    }

    async fn queued_settlements(&self, limit: i64) -> Result<Vec<SettlementItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, game_id, league, external_game_id, provider, outcome
            FROM settlement_queue
            WHERE status = 'QUEUED'
            ORDER BY enqueued_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let league = League::try_from(r.get::<String, _>("league").as_str())
                    .map_err(MatchdayError::Internal)?;
                let outcome = r
                    .get::<Option<String>, _>("outcome")
                    .map(|s| WinnerSide::try_from(s.as_str()))
                    .transpose()
                    .map_err(MatchdayError::Internal)?;
                Ok(SettlementItem {
                    id: r.get("id"),
                    game_id: r.get("game_id"),
                    league,
                    external_game_id: r.get("external_game_id"),
                    provider: r.get("provider"),
                    outcome,
                })
            })
            .collect()
    }

    async fn mark_settled(&self, item_id: i64, game_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE settlement_queue SET status = 'SETTLED' WHERE id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE games SET settled_at = now() WHERE id = $1 AND settled_at IS NULL")
            .bind(game_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Job locks ====================

    async fn acquire_lock(&self, key: &str, owner: &str, ttl_secs: i64) -> Result<LockAttempt> {
        let lock_store_err = |e: sqlx::Error| MatchdayError::LockStore {
            key: key.to_string(),
            cause: e.to_string(),
        };

        let row = sqlx::query(
            r#"
            INSERT INTO job_locks (key, locked_by, expires_at)
            VALUES ($1, $2, now() + INTERVAL '1 second' * $3)
            ON CONFLICT (key) DO UPDATE SET
                locked_by = EXCLUDED.locked_by,
                expires_at = EXCLUDED.expires_at
            WHERE job_locks.expires_at < now()
            RETURNING locked_by
            "#,
        )
        .bind(key)
        .bind(owner)
        .bind(ttl_secs as f64)
        .fetch_optional(&self.pool)
        .await
        .map_err(lock_store_err)?;

        if row.is_some() {
            debug!(key, owner, ttl_secs, "acquired stage lock");
            return Ok(LockAttempt::won());
        }

        // The holder may release between the two statements; still lost.
        let existing = sqlx::query(
            "SELECT key, locked_by, expires_at FROM job_locks WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(lock_store_err)?
        .map(|r| JobLock {
            key: r.get("key"),
            locked_by: r.get("locked_by"),
            expires_at: r.get("expires_at"),
        });

        match &existing {
            Some(lock) => debug!(key, owner, holder = %lock.locked_by, "stage lock held elsewhere"),
            None => debug!(key, owner, "stage lock held elsewhere"),
        }
        Ok(LockAttempt {
            acquired: false,
            existing,
        })
    }

    async fn release_lock(&self, key: &str, owner: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM job_locks WHERE key = $1 AND locked_by = $2")
            .bind(key)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| MatchdayError::LockStore {
                key: key.to_string(),
                cause: e.to_string(),
            })?;

        if result.rows_affected() == 0 {
            warn!(key, owner, "lock was already expired or stolen at release");
        }
        Ok(())
    }

    async fn cleanup_expired_locks(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM job_locks WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        let reaped = result.rows_affected();
        if reaped > 0 {
            debug!(reaped, "removed expired stage locks");
        }
        Ok(reaped)
    }

    // ==================== Job runs ====================

    async fn record_run_start(&self, job_name: &str, run_type: RunType) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO job_runs (id, job_name, run_type, status)
            VALUES ($1, $2, $3, 'running')
            "#,
        )
        .bind(id)
        .bind(job_name)
        .bind(run_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn record_run_finish<'a>(
        &self,
        run_id: Uuid,
        status: &str,
        duration_ms: i64,
        counts: &StageCounts,
        error: Option<&'a str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_runs SET
                status = $2,
                finished_at = now(),
                duration_ms = $3,
                counts = $4,
                error = $5
            WHERE id = $1 AND finished_at IS NULL
            "#,
        )
        .bind(run_id)
        .bind(status)
        .bind(duration_ms)
        .bind(serde_json::to_value(counts)?)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Status ====================

    async fn status_overview(&self) -> Result<StatusOverview> {
        let lock_rows = sqlx::query(
            r#"
            SELECT key, locked_by, expires_at
            FROM job_locks
            WHERE expires_at > now()
            ORDER BY key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let locks = lock_rows
            .iter()
            .map(|r| JobLock {
                key: r.get("key"),
                locked_by: r.get("locked_by"),
                expires_at: r.get("expires_at"),
            })
            .collect();

        let run_rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (job_name)
                   id, job_name, run_type, status, started_at, finished_at,
                   duration_ms, counts, error
            FROM job_runs
            ORDER BY job_name, started_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let latest_runs = run_rows
            .iter()
            .map(|r| {
                let run_type = match r.get::<String, _>("run_type").as_str() {
                    "manual" => RunType::Manual,
                    _ => RunType::Scheduled,
                };
                JobRun {
                    id: r.get("id"),
                    job_name: r.get("job_name"),
                    run_type,
                    status: r.get("status"),
                    started_at: r.get("started_at"),
                    finished_at: r.get("finished_at"),
                    duration_ms: r.get("duration_ms"),
                    counts: r.get("counts"),
                    error: r.get("error"),
                }
            })
            .collect();

        let queued: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM settlement_queue WHERE status = 'QUEUED'")
                .fetch_one(&self.pool)
                .await?;

        Ok(StatusOverview {
            locks,
            latest_runs,
            queued,
        })
    }
}
