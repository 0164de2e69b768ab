//! Diesel/SQLite implementation of the store traits.

use std::collections::{HashMap, HashSet};

use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use uuid::Uuid;

use crate::db::connection::connect_sqlite;
use crate::filter::{RankFilter, RecomputeFilter};
use crate::models::{ClassScore, CpaChanges, CpaRow, NewTermGpa, TermGpaChanges, TermGpaRow};
use crate::schema::{class_scores, cumulative_cpa, student_profiles, term_gpa};
use crate::score::{CpaKey, CpaRecord, ScoreRow, TermGpaRecord};
use crate::store::{
    Atomic, CpaStore, EnrollmentLookup, GpaStore, GradeLookup, ScoreSource, StoreError,
    StoreResult,
};

/// Status of classes whose scores are final.
pub const CONCLUDED: &str = "concluded";

// Stay well below SQLite's bound-parameter limit for IN (...) lists.
const LOOKUP_CHUNK: usize = 500;

/// Store backed by one SQLite connection.
pub struct SqliteStore {
    conn: SqliteConnection,
}

impl SqliteStore {
    /// Wrap an existing connection.
    pub fn new(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    /// Open `database_url` with the connection PRAGMAs applied.
    pub fn open(database_url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(connect_sqlite(database_url)?))
    }

    /// Borrow the underlying connection (seeding, ad-hoc queries).
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Every stored term GPA with its uuid, ordered by `(term_id, user_id)`.
    pub fn term_gpa_records(&mut self) -> StoreResult<Vec<(String, TermGpaRecord)>> {
        let rows = term_gpa::table
            .order((term_gpa::term_id.asc(), term_gpa::user_id.asc()))
            .select(TermGpaRow::as_select())
            .load::<TermGpaRow>(&mut self.conn)?;
        Ok(rows
            .into_iter()
            .map(|r| (r.uuid.clone(), TermGpaRecord::from(r)))
            .collect())
    }
}

impl ScoreSource for SqliteStore {
    fn concluded_scores(&mut self, filter: &RecomputeFilter) -> StoreResult<Vec<ScoreRow>> {
        let mut q = class_scores::table
            .filter(class_scores::status.eq(CONCLUDED))
            .select(ClassScore::as_select())
            .into_boxed();
        if let Some(term) = &filter.term_id {
            q = q.filter(class_scores::term_id.eq(term));
        }
        if let Some(program) = &filter.program_id {
            q = q.filter(class_scores::program_id.eq(program));
        }
        if let Some(school) = &filter.school_id {
            q = q.filter(class_scores::school_id.eq(school));
        }

        let rows = q
            .order((class_scores::term_start_date.asc(), class_scores::id.asc()))
            .load::<ClassScore>(&mut self.conn)?;
        tracing::debug!(rows = rows.len(), %filter, "loaded concluded scores");
        Ok(rows.into_iter().map(ScoreRow::from).collect())
    }

    fn program_history(
        &mut self,
        program_id: &str,
        user_ids: &[String],
    ) -> StoreResult<Vec<ScoreRow>> {
        let mut out = Vec::new();
        for chunk in user_ids.chunks(LOOKUP_CHUNK) {
            let rows = class_scores::table
                .filter(class_scores::status.eq(CONCLUDED))
                .filter(class_scores::program_id.eq(program_id))
                .filter(class_scores::user_id.eq_any(chunk))
                .order((class_scores::term_start_date.asc(), class_scores::id.asc()))
                .select(ClassScore::as_select())
                .load::<ClassScore>(&mut self.conn)?;
            out.extend(rows.into_iter().map(ScoreRow::from));
        }
        tracing::debug!(
            rows = out.len(),
            program_id,
            users = user_ids.len(),
            "loaded program history"
        );
        Ok(out)
    }
}

impl GradeLookup for SqliteStore {
    fn current_grades(&mut self, user_ids: &[String]) -> StoreResult<HashMap<String, String>> {
        let mut out = HashMap::with_capacity(user_ids.len());
        for chunk in user_ids.chunks(LOOKUP_CHUNK) {
            let rows: Vec<(String, Option<String>)> = student_profiles::table
                .filter(student_profiles::user_id.eq_any(chunk))
                .select((student_profiles::user_id, student_profiles::grade_id))
                .load(&mut self.conn)?;
            out.extend(
                rows.into_iter()
                    .filter_map(|(user, grade)| grade.map(|g| (user, g))),
            );
        }
        Ok(out)
    }
}

impl EnrollmentLookup for SqliteStore {
    fn active_students(&mut self, user_ids: &[String]) -> StoreResult<HashSet<String>> {
        let mut out = HashSet::with_capacity(user_ids.len());
        for chunk in user_ids.chunks(LOOKUP_CHUNK) {
            let rows: Vec<String> = student_profiles::table
                .filter(student_profiles::user_id.eq_any(chunk))
                .filter(student_profiles::is_active.eq(true))
                .select(student_profiles::user_id)
                .load(&mut self.conn)?;
            out.extend(rows);
        }
        Ok(out)
    }
}

impl GpaStore for SqliteStore {
    fn upsert_term_gpa(&mut self, record: &TermGpaRecord) -> StoreResult<()> {
        let changes = TermGpaChanges::from(record);
        let row = NewTermGpa {
            uuid: Uuid::new_v4().to_string(),
            changes: changes.clone(),
        };
        diesel::insert_into(term_gpa::table)
            .values(&row)
            .on_conflict((term_gpa::term_id, term_gpa::user_id))
            .do_update()
            .set(&changes)
            .execute(&mut self.conn)?;
        Ok(())
    }
}

impl CpaStore for SqliteStore {
    fn upsert_cpa(&mut self, record: &CpaRecord) -> StoreResult<()> {
        let changes = CpaChanges::from(record);
        diesel::insert_into(cumulative_cpa::table)
            .values(&changes)
            .on_conflict((cumulative_cpa::program_id, cumulative_cpa::user_id))
            .do_update()
            .set(&changes)
            .execute(&mut self.conn)?;
        Ok(())
    }

    fn query_cpa(&mut self, filter: &RankFilter) -> StoreResult<Vec<CpaRecord>> {
        let mut q = cumulative_cpa::table
            .select(CpaRow::as_select())
            .into_boxed();
        if let Some(grade) = &filter.grade_id {
            q = q.filter(cumulative_cpa::grade_id.eq(grade));
        }
        if let Some(program) = &filter.program_id {
            q = q.filter(cumulative_cpa::program_id.eq(program));
        }
        if let Some(school) = &filter.school_id {
            q = q.filter(cumulative_cpa::school_id.eq(school));
        }
        let rows = q
            .order((cumulative_cpa::program_id.asc(), cumulative_cpa::user_id.asc()))
            .load::<CpaRow>(&mut self.conn)?;
        Ok(rows.into_iter().map(CpaRecord::from).collect())
    }

    fn update_cpa_rank(&mut self, key: &CpaKey, rank: Option<i32>) -> StoreResult<()> {
        let n = diesel::update(
            cumulative_cpa::table.filter(
                cumulative_cpa::program_id
                    .eq(&key.program_id)
                    .and(cumulative_cpa::user_id.eq(&key.user_id)),
            ),
        )
        .set(cumulative_cpa::rank.eq(rank))
        .execute(&mut self.conn)?;

        if n == 0 {
            return Err(StoreError::MissingCpa {
                program_id: key.program_id.clone(),
                user_id: key.user_id.clone(),
            });
        }
        Ok(())
    }
}

impl Atomic for SqliteStore {
    /// Runs `f` inside `BEGIN IMMEDIATE` so the write lock is taken up front
    /// and a concurrent writer fails fast instead of mid-run.
    fn atomically<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self) -> StoreResult<T>,
    {
        // Not `immediate_transaction`: `f` needs the whole store, and a nested
        // call there becomes a savepoint instead of an error.
        AnsiTransactionManager::begin_transaction_sql(&mut self.conn, "BEGIN IMMEDIATE")
            .map_err(|e| match e {
                DieselError::AlreadyInTransaction => StoreError::NestedTransaction,
                other => StoreError::Database(other),
            })?;

        match f(self) {
            Ok(value) => {
                AnsiTransactionManager::commit_transaction(&mut self.conn)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = AnsiTransactionManager::rollback_transaction(&mut self.conn)
                {
                    tracing::error!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
