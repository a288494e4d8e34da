//! Settlement worker seam
//!
//! Settlement itself lives outside this service. The pipeline only decides
//! *when* a game is ready and hands it across this trait; whatever is on
//! the other side owns payout resolution.

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::store::SettlementItem;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementWorker: Send + Sync {
    /// Hand one concluded game to the downstream settler. Returning Ok
    /// means the hand-off was accepted and the queue item may be marked
    /// settled; an Err leaves the item queued for the next drain.
    async fn settle(&self, item: &SettlementItem) -> Result<()>;
}

/// Default worker: announces the hand-off and accepts it. Deployments wire
/// a real settler here; standalone runs still drain the queue visibly.
pub struct LoggingSettlementWorker;

#[async_trait]
impl SettlementWorker for LoggingSettlementWorker {
    async fn settle(&self, item: &SettlementItem) -> Result<()> {
        info!(
            queue_item = item.id,
            game_id = item.game_id,
            league = %item.league,
            external_game_id = %item.external_game_id,
            outcome = item.outcome.map(|o| o.as_str()).unwrap_or("NONE"),
            "handing concluded game to settlement"
        );
        Ok(())
    }
}
