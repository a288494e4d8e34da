//! Raw event to upsert-row conversion
//!
//! Pure: placeholder filtering, status normalization, winner derivation
//! and season attribution happen here, before anything touches the store.

use crate::adapters::RawEvent;
use crate::domain::{GameStatus, GameUpsert};
use crate::leagues::season_for_date;
use crate::normalize::{determine_winner, is_placeholder_game, normalize_status};

#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub upserts: Vec<GameUpsert>,
    pub filtered: u64,
    pub unknown_status: u64,
}

/// Convert fetched events into store rows. Placeholder fixtures are
/// dropped, unrecognized statuses are counted and persisted as SCHEDULED,
/// and a winner is derived only for FINAL games with both scores present.
pub fn prepare_upserts(provider: &str, events: &[RawEvent]) -> PreparedBatch {
    let mut batch = PreparedBatch::default();

    for event in events {
        if is_placeholder_game(event.league, &event.home_team, &event.away_team) {
            batch.filtered += 1;
            continue;
        }

        let (status_norm, unknown) = normalize_status(&event.status_raw).for_storage();
        if unknown {
            batch.unknown_status += 1;
        }

        let winner_side = match (status_norm, event.home_score, event.away_score) {
            (GameStatus::Final, Some(home), Some(away)) => Some(determine_winner(home, away)),
            _ => None,
        };

        batch.upserts.push(GameUpsert {
            league: event.league,
            external_game_id: event.external_id.clone(),
            provider: provider.to_string(),
            season: season_for_date(event.league, event.starts_at.date_naive()),
            starts_at: event.starts_at,
            status_raw: event.status_raw.clone(),
            status_norm,
            home_team: event.home_team.clone(),
            away_team: event.away_team.clone(),
            home_score: event.home_score,
            away_score: event.away_score,
            winner_side,
        });
    }

    batch
}
