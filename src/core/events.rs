use crate::core::model::{AttemptId, OptimizationStats, SessionState};

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged { state: SessionState },
    FileAccepted { name: String, size: u64 },
    FileRejected { reason: String },
    /// The advisory check reversed an earlier acceptance.
    AdvisoryRejected { name: String, reason: String },
    UploadStarted { attempt: AttemptId, name: String, size: u64 },
    StatsReady { attempt: AttemptId, stats: OptimizationStats },
    ArtifactReady { attempt: AttemptId, filename: String, size: u64 },
    Error { scope: String, message: String },
    Info { scope: String, message: String },
}
