//! Command-line interface
//!
//! One-shot trigger runs, the HTTP serve mode, status reads and schema
//! migration. The CLI goes through the same orchestrator path as the HTTP
//! boundary, so a manual run behaves exactly like a scheduled one.

use clap::{Parser, Subcommand};

use crate::domain::{BatchCursor, JobKind};
use crate::error::{MatchdayError, Result};

#[derive(Parser)]
#[command(name = "matchday")]
#[command(version = "0.1.0")]
#[command(about = "Sporting-event lifecycle pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory path
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one pipeline job and print the report
    Run {
        /// Job to run: discover, sync, finalize, settle or full
        job: String,
        /// Leagues to process (comma-separated, defaults to all enabled)
        #[arg(short, long)]
        leagues: Option<String>,
        /// Resume cursor from a previous report, as JSON
        #[arg(long)]
        cursor: Option<String>,
    },
    /// Serve the trigger HTTP endpoint
    Serve {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print locks, latest runs and queue depth
    Status,
    /// Apply database migrations
    Migrate,
}

pub fn parse_job(name: &str) -> Result<JobKind> {
    match name.to_lowercase().as_str() {
        "discover" => Ok(JobKind::Discover),
        "sync" => Ok(JobKind::Sync),
        "finalize" => Ok(JobKind::Finalize),
        "settle" => Ok(JobKind::Settle),
        "full" => Ok(JobKind::Full),
        other => Err(MatchdayError::Internal(format!(
            "unknown job '{other}', expected discover, sync, finalize, settle or full"
        ))),
    }
}

pub fn parse_cursor(raw: Option<&str>) -> Result<Option<BatchCursor>> {
    match raw {
        None => Ok(None),
        Some(json) => serde_json::from_str(json)
            .map(Some)
            .map_err(|e| MatchdayError::InvalidCursor(e.to_string())),
    }
}

pub fn parse_leagues(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|csv| {
        csv.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_names_parse_case_insensitively() {
        assert_eq!(parse_job("Discover").unwrap(), JobKind::Discover);
        assert_eq!(parse_job("FULL").unwrap(), JobKind::Full);
        assert!(parse_job("compact").is_err());
    }

    #[test]
    fn test_cursor_round_trips_from_report_json() {
        let cursor = parse_cursor(Some(r#"{"step":"sync","league_index":2}"#))
            .unwrap()
            .unwrap();
        assert_eq!(cursor.stage, JobKind::Sync);
        assert_eq!(cursor.league_index, 2);
        assert!(parse_cursor(None).unwrap().is_none());
        assert!(parse_cursor(Some("not json")).is_err());
    }

    #[test]
    fn test_league_list_splits_and_trims() {
        let leagues = parse_leagues(Some("NFL, nba ,,SOCCER")).unwrap();
        assert_eq!(leagues, vec!["NFL", "nba", "SOCCER"]);
        assert!(parse_leagues(None).is_none());
    }
}
