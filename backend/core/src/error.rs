use thiserror::Error;

/// Top-level error type for the FlipForge runtime.
///
/// Job-body failures never surface here; they are captured into the job's
/// run state by the executor. These variants are the conditions that cross
/// the management API boundary.
#[derive(Debug, Error)]
pub enum FlipError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("scheduler not initialized")]
    NotInitialized,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
