//! Boundary contracts between the engine and its data.
//!
//! The jobs only see these traits. Two backends implement them:
//! - [`SqliteStore`]: Diesel over SQLite, the production backend.
//! - [`MemoryStore`]: shared in-process state, for embedding and tests.
//!
//! Reads are batch round-trips (one query per lookup kind per run) and all
//! writes of a run go through [`Atomic::atomically`], the single transaction
//! boundary of a job.

use std::collections::{HashMap, HashSet};

use crate::filter::{RankFilter, RecomputeFilter};
use crate::score::{CpaKey, CpaRecord, ScoreRow, TermGpaRecord};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors surfaced by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected a query or a transaction step.
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A connection could not be established.
    #[error("connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    /// `atomically` was called while a transaction was already open.
    #[error("transaction already open; job transactions do not nest")]
    NestedTransaction,

    /// A rank update targeted a record that does not exist.
    #[error("no CPA record for program {program_id} and user {user_id}")]
    MissingCpa {
        /// Program of the missing record.
        program_id: String,
        /// Student of the missing record.
        user_id: String,
    },

    /// Injected or backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Result type used throughout the store layer.
pub type StoreResult<T> = Result<T, StoreError>;

/// Read model of concluded class scores.
pub trait ScoreSource {
    /// Rows of concluded classes matching `filter`, ordered by term start date.
    fn concluded_scores(&mut self, filter: &RecomputeFilter) -> StoreResult<Vec<ScoreRow>>;

    /// Every concluded row of `user_ids` in `program_id`, across all terms and
    /// schools. Rows of one user come back ordered by term start date.
    fn program_history(
        &mut self,
        program_id: &str,
        user_ids: &[String],
    ) -> StoreResult<Vec<ScoreRow>>;
}

/// Current grade of each student.
pub trait GradeLookup {
    /// `user -> grade` for the given users. Users without a grade are absent.
    fn current_grades(&mut self, user_ids: &[String]) -> StoreResult<HashMap<String, String>>;
}

/// Current enrollment of each student.
pub trait EnrollmentLookup {
    /// The subset of `user_ids` with an active student profile.
    fn active_students(&mut self, user_ids: &[String]) -> StoreResult<HashSet<String>>;
}

/// Term GPA persistence.
pub trait GpaStore {
    /// Insert or replace the record keyed by `(term_id, user_id)`.
    fn upsert_term_gpa(&mut self, record: &TermGpaRecord) -> StoreResult<()>;
}

/// Cumulative CPA persistence.
pub trait CpaStore {
    /// Insert or replace the record keyed by `(program_id, user_id)`.
    fn upsert_cpa(&mut self, record: &CpaRecord) -> StoreResult<()>;

    /// Records matching the grade/program/school parts of `filter`.
    ///
    /// `student_id` is not applied here; cohort selection is the caller's job.
    fn query_cpa(&mut self, filter: &RankFilter) -> StoreResult<Vec<CpaRecord>>;

    /// Rewrite only the rank of one record.
    fn update_cpa_rank(&mut self, key: &CpaKey, rank: Option<i32>) -> StoreResult<()>;
}

/// One all-or-nothing unit of work.
pub trait Atomic {
    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// Calling this from inside `f` fails with [`StoreError::NestedTransaction`].
    fn atomically<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self) -> StoreResult<T>;
}
