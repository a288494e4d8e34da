//! Status normalization and placeholder filtering
//!
//! Pure functions mapping a provider's raw status vocabulary and score
//! fields into the canonical model. No network or database code here so
//! the whole mapping is unit-testable in isolation.

use tracing::warn;

use crate::domain::{GameStatus, League, WinnerSide};
use crate::leagues::league_spec;

/// Normalizer output. `Unknown` is not a canonical status: it persists as
/// SCHEDULED but is counted and logged so an operator can see raw
/// vocabulary the mapping does not cover. It is never promoted to FINAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedStatus {
    Scheduled,
    Live,
    Final,
    Postponed,
    Canceled,
    Unknown,
}

impl NormalizedStatus {
    /// Canonical status to persist plus whether the raw value was
    /// unrecognized.
    pub fn for_storage(&self) -> (GameStatus, bool) {
        match self {
            NormalizedStatus::Scheduled => (GameStatus::Scheduled, false),
            NormalizedStatus::Live => (GameStatus::Live, false),
            NormalizedStatus::Final => (GameStatus::Final, false),
            NormalizedStatus::Postponed => (GameStatus::Postponed, false),
            NormalizedStatus::Canceled => (GameStatus::Canceled, false),
            NormalizedStatus::Unknown => (GameStatus::Scheduled, true),
        }
    }
}

/// Map a provider's raw status string to the canonical vocabulary.
///
/// Case-insensitive; the half-time family matches both the short codes
/// and any status containing "half" ("Second Half", "Halftime").
pub fn normalize_status(raw: &str) -> NormalizedStatus {
    let status = raw.trim().to_uppercase();
    match status.as_str() {
        "NS" | "NOT STARTED" => NormalizedStatus::Scheduled,
        "1H" | "2H" | "HT" => NormalizedStatus::Live,
        "FT" => NormalizedStatus::Final,
        "CANCELLED" | "CANCELED" => NormalizedStatus::Canceled,
        "POSTPONED" => NormalizedStatus::Postponed,
        _ if status.contains("HALF") => NormalizedStatus::Live,
        _ => {
            warn!(raw_status = raw, "unrecognized provider status");
            NormalizedStatus::Unknown
        }
    }
}

/// Winner of a concluded game. Only meaningful once the status is FINAL.
pub fn determine_winner(home_score: i32, away_score: i32) -> WinnerSide {
    match home_score.cmp(&away_score) {
        std::cmp::Ordering::Greater => WinnerSide::Home,
        std::cmp::Ordering::Less => WinnerSide::Away,
        std::cmp::Ordering::Equal => WinnerSide::Draw,
    }
}

const GENERIC_PLACEHOLDERS: &[&str] = &["TBD", "TBA", "EAST", "WEST", "NORTH", "SOUTH"];

/// Whether a team name marks a non-bettable fixture (conference
/// exhibitions, all-star and skills events, undetermined participants).
/// Such events must never produce a game row or a settlement item.
pub fn is_placeholder_team(league: League, name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return true;
    }
    let upper = trimmed.to_uppercase();

    if GENERIC_PLACEHOLDERS.contains(&upper.as_str()) {
        return true;
    }
    if upper.contains("ALL-STAR") || upper.contains("ALL STAR") || upper.contains("SKILLS") {
        return true;
    }
    league_spec(league)
        .placeholder_teams
        .iter()
        .any(|p| p.eq_ignore_ascii_case(trimmed))
}

/// Placeholder check over both sides of a fixture.
pub fn is_placeholder_game(league: League, home_team: &str, away_team: &str) -> bool {
    is_placeholder_team(league, home_team) || is_placeholder_team(league, away_team)
}
