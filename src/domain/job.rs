use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stages plus the composite "run everything" mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Discover,
    Sync,
    Finalize,
    Settle,
    Full,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Discover => "discover",
            JobKind::Sync => "sync",
            JobKind::Finalize => "finalize",
            JobKind::Settle => "settle",
            JobKind::Full => "full",
        }
    }

    /// The four lockable stages. `full` acquires each stage's lock
    /// independently rather than an umbrella lock.
    pub const STAGES: [JobKind; 4] = [
        JobKind::Discover,
        JobKind::Sync,
        JobKind::Finalize,
        JobKind::Settle,
    ];
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an invocation was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    #[default]
    Scheduled,
    Manual,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Scheduled => "scheduled",
            RunType::Manual => "manual",
        }
    }
}

/// A live distributed lock row for one stage key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLock {
    pub key: String,
    pub locked_by: String,
    pub expires_at: DateTime<Utc>,
}

impl JobLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Audit row for one stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: Uuid,
    pub job_name: String,
    pub run_type: RunType,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub counts: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Opaque resume token: which stage, and how far through the league list.
///
/// Caller-supplied cursors come in over the trigger boundary and are
/// validated against the configured league list before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCursor {
    #[serde(rename = "step")]
    pub stage: JobKind,
    pub league_index: usize,
}

impl BatchCursor {
    pub fn start(stage: JobKind) -> Self {
        Self {
            stage,
            league_index: 0,
        }
    }

    /// Cursor for the next league, or None when the list is exhausted.
    pub fn advance(&self, league_count: usize) -> Option<Self> {
        let next = self.league_index + 1;
        (next < league_count).then_some(Self {
            stage: self.stage,
            league_index: next,
        })
    }

    pub fn validate(&self, expected_stage: JobKind, league_count: usize) -> Result<(), String> {
        if self.stage != expected_stage {
            return Err(format!(
                "cursor stage '{}' does not match job '{}'",
                self.stage, expected_stage
            ));
        }
        if self.league_index >= league_count {
            return Err(format!(
                "cursor league_index {} out of range (have {} leagues)",
                self.league_index, league_count
            ));
        }
        Ok(())
    }
}

/// Trigger boundary request, consumed from the external scheduler, the
/// admin tooling and the CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRequest {
    pub job: JobKind,
    #[serde(default)]
    pub leagues: Option<Vec<String>>,
    #[serde(default)]
    pub cursor: Option<BatchCursor>,
    #[serde(default)]
    pub run_type: RunType,
}

/// Per-stage work counters, persisted in job_runs.counts and surfaced in
/// the trigger response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub fetched: u64,
    pub filtered: u64,
    pub unknown_status: u64,
    pub inserted: u64,
    pub updated: u64,
    pub enqueued: u64,
    pub forced_final: u64,
    pub unresolved: u64,
    pub settled: u64,
}

impl StageCounts {
    pub fn merge(&mut self, other: &StageCounts) {
        self.fetched += other.fetched;
        self.filtered += other.filtered;
        self.unknown_status += other.unknown_status;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.enqueued += other.enqueued;
        self.forced_final += other.forced_final;
        self.unresolved += other.unresolved;
        self.settled += other.settled;
    }
}

/// Outcome of one stage execution (before response aggregation).
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub job: JobKind,
    pub skipped: bool,
    pub counts: StageCounts,
    pub errors: Vec<String>,
    pub has_more: bool,
    pub next_cursor: Option<BatchCursor>,
}

impl StageReport {
    pub fn skipped(job: JobKind) -> Self {
        Self {
            job,
            skipped: true,
            counts: StageCounts::default(),
            errors: Vec::new(),
            has_more: false,
            next_cursor: None,
        }
    }
}

/// Trigger boundary response. Field names are a durable contract consumed
/// by dashboards and the external scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub success: bool,
    pub job: JobKind,
    pub duration_ms: u64,
    pub skipped: bool,
    pub results: serde_json::Value,
    pub errors: Vec<String>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<BatchCursor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_advances_through_leagues() {
        let cursor = BatchCursor::start(JobKind::Discover);
        let next = cursor.advance(3).unwrap();
        assert_eq!(next.league_index, 1);
        let last = next.advance(3).unwrap();
        assert_eq!(last.league_index, 2);
        assert!(last.advance(3).is_none());
    }

    #[test]
    fn test_cursor_validation_rejects_stage_mismatch() {
        let cursor = BatchCursor::start(JobKind::Sync);
        assert!(cursor.validate(JobKind::Discover, 5).is_err());
        assert!(cursor.validate(JobKind::Sync, 5).is_ok());
    }

    #[test]
    fn test_cursor_validation_rejects_out_of_range_index() {
        let cursor = BatchCursor {
            stage: JobKind::Discover,
            league_index: 7,
        };
        assert!(cursor.validate(JobKind::Discover, 5).is_err());
    }

    #[test]
    fn test_cursor_wire_shape_uses_step() {
        let cursor = BatchCursor {
            stage: JobKind::Discover,
            league_index: 2,
        };
        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(json["step"], "discover");
        assert_eq!(json["league_index"], 2);
    }

    #[test]
    fn test_run_report_wire_field_names() {
        let report = RunReport {
            success: true,
            job: JobKind::Sync,
            duration_ms: 12,
            skipped: false,
            results: serde_json::json!({}),
            errors: vec![],
            has_more: true,
            next_cursor: Some(BatchCursor::start(JobKind::Sync)),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("hasMore").is_some());
        assert!(json.get("nextCursor").is_some());
        assert!(json.get("duration_ms").is_some());
    }

    #[test]
    fn test_trigger_request_minimal_body() {
        let req: TriggerRequest = serde_json::from_str(r#"{"job":"discover"}"#).unwrap();
        assert_eq!(req.job, JobKind::Discover);
        assert!(req.leagues.is_none());
        assert!(req.cursor.is_none());
        assert_eq!(req.run_type, RunType::Scheduled);
    }
}
