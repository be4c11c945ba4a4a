use thiserror::Error;

/// Every way a run can fail. None of these are retried: the computation is
/// deterministic, so any failure is fatal to the whole cohort.
#[derive(Error, Debug)]
pub enum SieveError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("the ratio of n / workers is too low: {0}")]
    PartitionPrecondition(String),

    #[error("error allocating memory for a grid of {entries} entries")]
    Allocation { entries: usize },

    #[error("prime count mismatch: cohort found {cohort}, sequential sieve found {reference}")]
    VerificationMismatch { cohort: u64, reference: u64 },

    #[error("failed to start worker {rank}: {source}")]
    Spawn {
        rank: usize,
        source: std::io::Error,
    },

    /// A peer failed and the cohort was torn down. The failing worker reports
    /// the cause, so this variant is never printed.
    #[error("aborted by a peer worker")]
    Aborted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SieveError {
    pub fn is_abort(&self) -> bool {
        matches!(self, SieveError::Aborted)
    }
}

pub type Result<T> = std::result::Result<T, SieveError>;
