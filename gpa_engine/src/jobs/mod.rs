//! Batch jobs: full score recompute and rank-only recompute.
//!
//! Both jobs are linear, single-threaded pipelines. They read in bulk, compute
//! in memory, and write everything inside one [`crate::store::Atomic`] unit, so
//! a failed run leaves the stores exactly as they were. Re-running with the
//! same filter is safe because every write is an upsert by natural key.

pub mod recompute;
pub mod rerank;

pub use recompute::{RecomputeSummary, enrich_grades, run_score_recompute};
pub use rerank::{RerankSummary, run_rank_recompute};

use crate::store::StoreError;

/// Failure of a whole job run. Nothing was committed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Reading the score source failed.
    #[error("failed to read scores ({filter}): {source}")]
    Source {
        /// Filter of the run, rendered for logs.
        filter: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The write transaction failed and was rolled back.
    #[error("failed to persist results ({filter}): {source}")]
    Persistence {
        /// Filter of the run, rendered for logs.
        filter: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// The worker could not open a store for the job.
    #[error("failed to open store: {0}")]
    Open(String),

    /// The job panicked or its task was cancelled.
    #[error("job aborted: {0}")]
    Aborted(String),
}

/// Outcome of one job, whichever kind it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSummary {
    /// A score recompute ran.
    Recompute(RecomputeSummary),
    /// A rank-only recompute ran.
    Rerank(RerankSummary),
}

impl std::fmt::Display for JobSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recompute(s) => write!(
                f,
                "recompute: {} rows, {} students, {} term records, {} CPA records ({} not studying)",
                s.rows_read,
                s.students,
                s.term_records_written,
                s.cpa_records_written,
                s.cpa_records_skipped
            ),
            Self::Rerank(s) => write!(
                f,
                "rerank: {} records in {} cohorts, {} ranks written ({} skipped)",
                s.records_read, s.cohorts, s.ranks_written, s.records_skipped
            ),
        }
    }
}
