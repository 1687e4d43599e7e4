use crate::core::api::OptimizeBackend;
use crate::core::error::OptimizeError;
use crate::core::model::{AdvisoryVerdict, CandidateFile, ALLOWED_EXTENSIONS, MAX_UPLOAD_BYTES};

/// Synchronous accept/reject on extension and size. Deliberately network-free
/// so an unsupported candidate costs nothing.
pub fn validate(file: &CandidateFile) -> Result<(), OptimizeError> {
    if !ALLOWED_EXTENSIONS.contains(&file.extension.as_str()) {
        return Err(OptimizeError::Validation("unsupported format".to_string()));
    }
    if file.size == 0 {
        return Err(OptimizeError::Validation("empty file".to_string()));
    }
    if file.size > MAX_UPLOAD_BYTES {
        return Err(OptimizeError::Validation("too large".to_string()));
    }
    Ok(())
}

/// Server-side advisory check for the structurally riskier formats. Runs
/// after the candidate is already provisionally accepted and never blocks
/// that acceptance; only an explicit service rejection reverses it.
pub async fn advisory(backend: &dyn OptimizeBackend, file: &CandidateFile) -> AdvisoryVerdict {
    if !file.needs_advisory_check() {
        return AdvisoryVerdict::Acceptable;
    }
    backend.advisory_validate(file).await
}
