//! Settle stage: drain the settlement queue
//!
//! Hands queued items to the settlement worker one at a time. An item is
//! only marked settled after the worker accepts it; a rejected item stays
//! queued for the next drain.

use tracing::{info, warn};

use crate::domain::StageCounts;
use crate::error::StageError;
use crate::pipeline::StageContext;

pub async fn run_settle(ctx: &StageContext) -> (StageCounts, Vec<String>, bool) {
    let mut counts = StageCounts::default();
    let mut errors = Vec::new();

    let limit = ctx.settings.max_items;
    let items = match ctx.store.queued_settlements(limit).await {
        Ok(items) => items,
        Err(e) => {
            errors.push(format!("queue read failed: {e}"));
            return (counts, errors, false);
        }
    };
    let drained = items.len() as i64;

    for item in items {
        if ctx.cancel.is_cancelled() {
            errors.push("run cancelled".to_string());
            break;
        }

        match ctx.worker.settle(&item).await {
            Ok(()) => match ctx.store.mark_settled(item.id, item.game_id).await {
                Ok(()) => counts.settled += 1,
                Err(e) => errors.push(format!(
                    "could not mark queue item {} settled: {e}",
                    item.id
                )),
            },
            Err(e) => {
                warn!(
                    queue_item = item.id,
                    game_id = item.game_id,
                    error = %e,
                    "settlement hand-off rejected, item stays queued"
                );
                errors.push(
                    StageError::Settle {
                        item_id: item.id,
                        cause: e.to_string(),
                    }
                    .to_string(),
                );
            }
        }
    }

    let has_more = limit > 0 && drained >= limit;
    info!(
        settled = counts.settled,
        errors = errors.len(),
        has_more,
        "settle pass complete"
    );
    (counts, errors, has_more)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use mockall::predicate::*;

    use crate::adapters::FeedRegistry;
    use crate::domain::{League, WinnerSide};
    use crate::error::MatchdayError;
    use crate::pipeline::{CancelFlag, PipelineSettings};
    use crate::settlement::MockSettlementWorker;
    use crate::store::{MockLifecycleStore, SettlementItem};

    fn item(id: i64, game_id: i64) -> SettlementItem {
        SettlementItem {
            id,
            game_id,
            league: League::Nba,
            external_game_id: format!("ext-{game_id}"),
            provider: "apisports".to_string(),
            outcome: Some(WinnerSide::Away),
        }
    }

    fn context(store: MockLifecycleStore, worker: MockSettlementWorker) -> StageContext {
        StageContext {
            store: Arc::new(store),
            feeds: FeedRegistry::new(),
            worker: Arc::new(worker),
            settings: PipelineSettings {
                max_items: 2,
                ..PipelineSettings::default()
            },
            cancel: CancelFlag::new(),
        }
    }

    #[tokio::test]
    async fn test_accepted_items_are_marked_settled() {
        let mut store = MockLifecycleStore::new();
        store
            .expect_queued_settlements()
            .with(eq(2i64))
            .returning(|_| Ok(vec![item(1, 100)]));
        store
            .expect_mark_settled()
            .with(eq(1i64), eq(100i64))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut worker = MockSettlementWorker::new();
        worker.expect_settle().times(1).returning(|_| Ok(()));

        let ctx = context(store, worker);
        let (counts, errors, has_more) = run_settle(&ctx).await;

        assert!(errors.is_empty());
        assert_eq!(counts.settled, 1);
        assert!(!has_more);
    }

    #[tokio::test]
    async fn test_rejected_item_stays_queued() {
        let mut store = MockLifecycleStore::new();
        store
            .expect_queued_settlements()
            .returning(|_| Ok(vec![item(2, 200)]));
        store.expect_mark_settled().times(0);

        let mut worker = MockSettlementWorker::new();
        worker
            .expect_settle()
            .returning(|_| Err(MatchdayError::Internal("settler offline".to_string())));

        let ctx = context(store, worker);
        let (counts, errors, _) = run_settle(&ctx).await;

        assert_eq!(counts.settled, 0);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("queue item 2"));
    }

    #[tokio::test]
    async fn test_full_batch_reports_more_work() {
        let mut store = MockLifecycleStore::new();
        store
            .expect_queued_settlements()
            .returning(|_| Ok(vec![item(3, 300), item(4, 400)]));
        store.expect_mark_settled().times(2).returning(|_, _| Ok(()));

        let mut worker = MockSettlementWorker::new();
        worker.expect_settle().times(2).returning(|_| Ok(()));

        let ctx = context(store, worker);
        let (counts, errors, has_more) = run_settle(&ctx).await;

        assert!(errors.is_empty());
        assert_eq!(counts.settled, 2);
        assert!(has_more);
    }
}
