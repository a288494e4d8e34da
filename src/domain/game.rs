use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported sports leagues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum League {
    Nfl,
    Nba,
    Nhl,
    Mlb,
    Soccer,
}

impl League {
    pub fn as_str(&self) -> &'static str {
        match self {
            League::Nfl => "NFL",
            League::Nba => "NBA",
            League::Nhl => "NHL",
            League::Mlb => "MLB",
            League::Soccer => "SOCCER",
        }
    }

    pub const ALL: [League; 5] = [
        League::Nfl,
        League::Nba,
        League::Nhl,
        League::Mlb,
        League::Soccer,
    ];
}

impl std::fmt::Display for League {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for League {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_uppercase().as_str() {
            "NFL" => Ok(League::Nfl),
            "NBA" => Ok(League::Nba),
            "NHL" => Ok(League::Nhl),
            "MLB" => Ok(League::Mlb),
            "SOCCER" => Ok(League::Soccer),
            other => Err(format!("unknown league: {other}")),
        }
    }
}

/// Canonical game status. Terminal statuses never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
    Postponed,
    Canceled,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "SCHEDULED",
            GameStatus::Live => "LIVE",
            GameStatus::Final => "FINAL",
            GameStatus::Postponed => "POSTPONED",
            GameStatus::Canceled => "CANCELED",
        }
    }

    /// FINAL, POSTPONED and CANCELED are terminal: once reached, a game
    /// never returns to SCHEDULED or LIVE.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GameStatus::Final | GameStatus::Postponed | GameStatus::Canceled
        )
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for GameStatus {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "SCHEDULED" => Ok(GameStatus::Scheduled),
            "LIVE" => Ok(GameStatus::Live),
            "FINAL" => Ok(GameStatus::Final),
            "POSTPONED" => Ok(GameStatus::Postponed),
            "CANCELED" => Ok(GameStatus::Canceled),
            other => Err(format!("unknown game status: {other}")),
        }
    }
}

/// Which side won a concluded game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WinnerSide {
    Home,
    Away,
    Draw,
}

impl WinnerSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            WinnerSide::Home => "HOME",
            WinnerSide::Away => "AWAY",
            WinnerSide::Draw => "DRAW",
        }
    }
}

impl std::fmt::Display for WinnerSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for WinnerSide {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "HOME" => Ok(WinnerSide::Home),
            "AWAY" => Ok(WinnerSide::Away),
            "DRAW" => Ok(WinnerSide::Draw),
            other => Err(format!("unknown winner side: {other}")),
        }
    }
}

/// Canonical game record, the single source of truth for event state.
///
/// Unique key: (league, external_game_id). Team names are display names,
/// not foreign keys — providers rename and rebrand teams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub league: League,
    pub external_game_id: String,
    pub provider: String,
    pub season: i32,
    pub starts_at: DateTime<Utc>,
    pub status_raw: String,
    pub status_norm: GameStatus,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub winner_side: Option<WinnerSide>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
}

/// A normalized candidate row for the game store.
#[derive(Debug, Clone)]
pub struct GameUpsert {
    pub league: League,
    pub external_game_id: String,
    pub provider: String,
    pub season: i32,
    pub starts_at: DateTime<Utc>,
    pub status_raw: String,
    pub status_norm: GameStatus,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub winner_side: Option<WinnerSide>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_league_round_trip() {
        for league in League::ALL {
            assert_eq!(League::try_from(league.as_str()).unwrap(), league);
        }
        assert!(League::try_from("XFL").is_err());
    }

    #[test]
    fn test_league_parse_is_case_insensitive() {
        assert_eq!(League::try_from("nba").unwrap(), League::Nba);
        assert_eq!(League::try_from("Soccer").unwrap(), League::Soccer);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(GameStatus::Final.is_terminal());
        assert!(GameStatus::Postponed.is_terminal());
        assert!(GameStatus::Canceled.is_terminal());
        assert!(!GameStatus::Scheduled.is_terminal());
        assert!(!GameStatus::Live.is_terminal());
    }

    #[test]
    fn test_status_serde_uses_wire_names() {
        let json = serde_json::to_string(&GameStatus::Scheduled).unwrap();
        assert_eq!(json, "\"SCHEDULED\"");
        let back: GameStatus = serde_json::from_str("\"CANCELED\"").unwrap();
        assert_eq!(back, GameStatus::Canceled);
    }
}
