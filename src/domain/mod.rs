pub mod game;
pub mod job;

pub use game::{Game, GameStatus, GameUpsert, League, WinnerSide};
pub use job::{
    BatchCursor, JobKind, JobLock, JobRun, RunReport, RunType, StageCounts, StageReport,
    TriggerRequest,
};
