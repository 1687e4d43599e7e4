use std::time::Duration;

/// Failure taxonomy for one optimization cycle. Everything here is
/// recoverable: the session lands in `Error` and the user retries.
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Transport(String),

    #[error("optimization timed out after {}s - the server may be busy or the file too large, try again", .0.as_secs())]
    Timeout(Duration),

    #[error("server returned an empty result")]
    EmptyResult,

    #[error("submission cancelled")]
    Cancelled,
}

impl OptimizeError {
    /// One human-readable line for the user surface.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
