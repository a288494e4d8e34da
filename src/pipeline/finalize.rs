//! Finalize stage: sweep for games the provider never closed out
//!
//! Catches games stuck in LIVE long after their start (provider outage,
//! missing status field) and forces them FINAL from the scores on record.
//! Also repairs the queue: any FINAL game that never got a settlement
//! item, for whatever reason, gets one here.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::domain::StageCounts;
use crate::normalize::determine_winner;
use crate::pipeline::StageContext;
use crate::store::EnqueueOutcome;

pub async fn run_finalize(ctx: &StageContext) -> (StageCounts, Vec<String>) {
    let mut counts = StageCounts::default();
    let mut errors = Vec::new();

    let cutoff = Utc::now() - Duration::hours(ctx.settings.stale_after_hours);
    let lingering = match ctx.store.lingering_live_games(cutoff).await {
        Ok(games) => games,
        Err(e) => {
            errors.push(format!("lingering-game scan failed: {e}"));
            return (counts, errors);
        }
    };

    for game in lingering {
        if ctx.cancel.is_cancelled() {
            errors.push("run cancelled".to_string());
            return (counts, errors);
        }

        match (game.home_score, game.away_score) {
            (Some(home), Some(away)) => {
                let winner = determine_winner(home, away);
                match ctx.store.force_final(game.id, Some(winner)).await {
                    Ok(true) => {
                        counts.forced_final += 1;
                        info!(
                            game_id = game.id,
                            league = %game.league,
                            external_game_id = %game.external_game_id,
                            winner = winner.as_str(),
                            "forced lingering LIVE game to FINAL"
                        );
                        match ctx.store.enqueue_settlement(game.id).await {
                            Ok(EnqueueOutcome::Enqueued) => counts.enqueued += 1,
                            Ok(_) => {}
                            Err(e) => {
                                errors.push(format!("enqueue failed for game {}: {e}", game.id))
                            }
                        }
                    }
                    // Another runner got there first; its enqueue covers it.
                    Ok(false) => {}
                    Err(e) => errors.push(format!("force final failed for game {}: {e}", game.id)),
                }
            }
            _ => {
                counts.unresolved += 1;
                warn!(
                    game_id = game.id,
                    league = %game.league,
                    external_game_id = %game.external_game_id,
                    "lingering LIVE game has no scores, cannot finalize"
                );
            }
        }
    }

    match ctx.store.final_unqueued_game_ids().await {
        Ok(ids) => {
            for game_id in ids {
                if ctx.cancel.is_cancelled() {
                    errors.push("run cancelled".to_string());
                    break;
                }
                match ctx.store.enqueue_settlement(game_id).await {
                    Ok(EnqueueOutcome::Enqueued) => {
                        counts.enqueued += 1;
                        info!(game_id, "repaired missing settlement queue item");
                    }
                    Ok(_) => {}
                    Err(e) => errors.push(format!("enqueue failed for game {game_id}: {e}")),
                }
            }
        }
        Err(e) => errors.push(format!("queue repair scan failed: {e}")),
    }

    info!(
        forced_final = counts.forced_final,
        unresolved = counts.unresolved,
        enqueued = counts.enqueued,
        errors = errors.len(),
        "finalize pass complete"
    );
    (counts, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use chrono::{DateTime, TimeZone};
    use mockall::predicate::*;

    use crate::adapters::FeedRegistry;
    use crate::domain::{Game, GameStatus, League, WinnerSide};
    use crate::pipeline::{CancelFlag, PipelineSettings};
    use crate::settlement::MockSettlementWorker;
    use crate::store::MockLifecycleStore;

    fn live_game(id: i64, home_score: Option<i32>, away_score: Option<i32>) -> Game {
        Game {
            id,
            league: League::Nfl,
            external_game_id: format!("ext-{id}"),
            provider: "apisports".to_string(),
            season: 2025,
            starts_at: Utc.with_ymd_and_hms(2025, 9, 8, 17, 0, 0).unwrap(),
            status_raw: "2H".to_string(),
            status_norm: GameStatus::Live,
            home_team: "Home Club".to_string(),
            away_team: "Away Club".to_string(),
            home_score,
            away_score,
            winner_side: None,
            finalized_at: None,
            settled_at: None,
            last_synced_at: Utc::now(),
        }
    }

    fn context(store: MockLifecycleStore) -> StageContext {
        StageContext {
            store: Arc::new(store),
            feeds: FeedRegistry::new(),
            worker: Arc::new(MockSettlementWorker::new()),
            settings: PipelineSettings::default(),
            cancel: CancelFlag::new(),
        }
    }

    #[tokio::test]
    async fn test_stale_live_game_with_scores_is_forced_final_and_enqueued() {
        let mut store = MockLifecycleStore::new();
        store
            .expect_lingering_live_games()
            .returning(|_: DateTime<Utc>| Ok(vec![live_game(10, Some(24), Some(17))]));
        store
            .expect_force_final()
            .with(eq(10i64), eq(Some(WinnerSide::Home)))
            .times(1)
            .returning(|_, _| Ok(true));
        store
            .expect_enqueue_settlement()
            .with(eq(10i64))
            .times(1)
            .returning(|_| Ok(EnqueueOutcome::Enqueued));
        store
            .expect_final_unqueued_game_ids()
            .returning(|| Ok(vec![]));

        let ctx = context(store);
        let (counts, errors) = run_finalize(&ctx).await;

        assert!(errors.is_empty());
        assert_eq!(counts.forced_final, 1);
        assert_eq!(counts.enqueued, 1);
        assert_eq!(counts.unresolved, 0);
    }

    #[tokio::test]
    async fn test_scoreless_stale_game_is_left_unresolved() {
        let mut store = MockLifecycleStore::new();
        store
            .expect_lingering_live_games()
            .returning(|_| Ok(vec![live_game(11, None, None)]));
        store.expect_force_final().times(0);
        store
            .expect_final_unqueued_game_ids()
            .returning(|| Ok(vec![]));

        let ctx = context(store);
        let (counts, errors) = run_finalize(&ctx).await;

        assert!(errors.is_empty());
        assert_eq!(counts.forced_final, 0);
        assert_eq!(counts.unresolved, 1);
    }

    #[tokio::test]
    async fn test_lost_force_race_does_not_enqueue_here() {
        let mut store = MockLifecycleStore::new();
        store
            .expect_lingering_live_games()
            .returning(|_| Ok(vec![live_game(12, Some(3), Some(3))]));
        store
            .expect_force_final()
            .returning(|_, _| Ok(false));
        store.expect_enqueue_settlement().times(0);
        store
            .expect_final_unqueued_game_ids()
            .returning(|| Ok(vec![]));

        let ctx = context(store);
        let (counts, errors) = run_finalize(&ctx).await;

        assert!(errors.is_empty());
        assert_eq!(counts.forced_final, 0);
        assert_eq!(counts.enqueued, 0);
    }

    #[tokio::test]
    async fn test_queue_repair_enqueues_stranded_final_games() {
        let mut store = MockLifecycleStore::new();
        store
            .expect_lingering_live_games()
            .returning(|_| Ok(vec![]));
        store
            .expect_final_unqueued_game_ids()
            .returning(|| Ok(vec![21, 22]));
        store
            .expect_enqueue_settlement()
            .times(2)
            .returning(|id| {
                if id == 21 {
                    Ok(EnqueueOutcome::Enqueued)
                } else {
                    Ok(EnqueueOutcome::AlreadySettled)
                }
            });

        let ctx = context(store);
        let (counts, errors) = run_finalize(&ctx).await;

        assert!(errors.is_empty());
        assert_eq!(counts.enqueued, 1);
    }
}
