//! Per-league configuration table
//!
//! Each league carries its upstream feed dialect and host, its
//! season-numbering rule, and the placeholder team names that mark
//! non-bettable fixtures for that league. All of it is table-driven so
//! adding a league is a new row, not new code paths.

use chrono::{Datelike, NaiveDate};

use crate::domain::League;

/// Which wire dialect the upstream provider speaks for a league.
///
/// US-format sports nest fields under a `game` object; soccer payloads are
/// keyed by `fixture`/`goals` with different field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDialect {
    UsSports,
    Soccer,
}

/// Static configuration for one league.
#[derive(Debug, Clone)]
pub struct LeagueSpec {
    pub league: League,
    pub dialect: FeedDialect,
    pub host: &'static str,
    pub provider: &'static str,
    /// Dates in months before this one belong to the previous calendar
    /// year's season. 1 means the season never crosses a year boundary.
    pub season_rollover_month: u32,
    pub placeholder_teams: &'static [&'static str],
}

const NFL: LeagueSpec = LeagueSpec {
    league: League::Nfl,
    dialect: FeedDialect::UsSports,
    host: "v1.american-football.api-sports.io",
    provider: "apisports",
    // Season spans September..February; January/February games belong to
    // the prior season year.
    season_rollover_month: 7,
    placeholder_teams: &["AFC", "NFC"],
};

const NBA: LeagueSpec = LeagueSpec {
    league: League::Nba,
    dialect: FeedDialect::UsSports,
    host: "v2.nba.api-sports.io",
    provider: "apisports",
    // October..June season.
    season_rollover_month: 8,
    placeholder_teams: &[],
};

const NHL: LeagueSpec = LeagueSpec {
    league: League::Nhl,
    dialect: FeedDialect::UsSports,
    host: "v1.hockey.api-sports.io",
    provider: "apisports",
    season_rollover_month: 8,
    placeholder_teams: &["Atlantic", "Metropolitan", "Central", "Pacific"],
};

const MLB: LeagueSpec = LeagueSpec {
    league: League::Mlb,
    dialect: FeedDialect::UsSports,
    host: "v1.baseball.api-sports.io",
    provider: "apisports",
    // March..October, single calendar year.
    season_rollover_month: 1,
    placeholder_teams: &["American League", "National League"],
};

const SOCCER: LeagueSpec = LeagueSpec {
    league: League::Soccer,
    dialect: FeedDialect::Soccer,
    host: "v3.football.api-sports.io",
    provider: "apisports",
    // August..May European season.
    season_rollover_month: 7,
    placeholder_teams: &[],
};

pub fn league_spec(league: League) -> &'static LeagueSpec {
    match league {
        League::Nfl => &NFL,
        League::Nba => &NBA,
        League::Nhl => &NHL,
        League::Mlb => &MLB,
        League::Soccer => &SOCCER,
    }
}

/// Season year a calendar date belongs to for a league.
///
/// Winter-crossing leagues attribute early-year dates to the prior
/// season year; single-year leagues always use the date's own year.
pub fn season_for_date(league: League, date: NaiveDate) -> i32 {
    let spec = league_spec(league);
    if date.month() < spec.season_rollover_month {
        date.year() - 1
    } else {
        date.year()
    }
}
