use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::League;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum MatchdayError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Provider errors
    #[error("Provider fetch failed for {league} on {date}: {cause}")]
    Fetch {
        league: League,
        date: NaiveDate,
        cause: String,
    },

    // Trigger boundary errors
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Unknown league: {0}")]
    UnknownLeague(String),

    // Lock store errors: the stage must not proceed without exclusivity
    #[error("Lock store unavailable for '{key}': {cause}")]
    LockStore { key: String, cause: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for MatchdayError
pub type Result<T> = std::result::Result<T, MatchdayError>;

/// A recoverable per-unit failure inside a stage run.
///
/// These never abort a stage: the failing league/date/event is skipped and
/// the error is carried in the stage report for operator visibility.
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("fetch failed for {league} {date}: {cause}")]
    Fetch {
        league: League,
        date: NaiveDate,
        cause: String,
    },

    #[error("dropped event {external_id} ({league}): {cause}")]
    Normalize {
        league: League,
        external_id: String,
        cause: String,
    },

    #[error("upsert batch failed for {league}: {cause}")]
    Upsert { league: League, cause: String },

    #[error("settlement hand-off failed for queue item {item_id}: {cause}")]
    Settle { item_id: i64, cause: String },
}

impl From<StageError> for MatchdayError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::Fetch {
                league,
                date,
                cause,
            } => MatchdayError::Fetch {
                league,
                date,
                cause,
            },
            other => MatchdayError::Internal(other.to_string()),
        }
    }
}
