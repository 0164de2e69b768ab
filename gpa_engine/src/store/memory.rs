//! In-process store: state behind an `Arc<Mutex<..>>` so clones share it.
//!
//! Transactions snapshot the state and restore it when the unit of work
//! fails or panics. Failure injection ([`MemoryStore::fail_writes_after`]) lets tests
//! exercise the all-or-nothing path without a database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::filter::{RankFilter, RecomputeFilter};
use crate::score::{CpaKey, CpaRecord, ScoreRow, TermGpaRecord, TermKey};
use crate::store::{
    Atomic, CpaStore, EnrollmentLookup, GpaStore, GradeLookup, ScoreSource, StoreError,
    StoreResult,
};

#[derive(Debug, Clone, Default)]
struct Profile {
    grade_id: Option<String>,
    is_active: bool,
}

#[derive(Debug, Clone, Default)]
struct State {
    scores: Vec<ScoreRow>,
    profiles: HashMap<String, Profile>,
    term_gpa: BTreeMap<TermKey, TermGpaRecord>,
    cpa: BTreeMap<CpaKey, CpaRecord>,
    writes_left: Option<usize>,
    in_transaction: bool,
}

/// Shared in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not poison the other clones.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add concluded score rows to the read model.
    pub fn add_scores(&self, rows: impl IntoIterator<Item = ScoreRow>) {
        self.lock().scores.extend(rows);
    }

    /// Set a student's current grade and enrollment.
    pub fn set_profile(&self, user_id: &str, grade_id: Option<&str>, is_active: bool) {
        self.lock().profiles.insert(
            user_id.to_string(),
            Profile {
                grade_id: grade_id.map(str::to_string),
                is_active,
            },
        );
    }

    /// Allow `n` more successful writes, then fail every write.
    pub fn fail_writes_after(&self, n: usize) {
        self.lock().writes_left = Some(n);
    }

    /// Stored term GPA records ordered by `(term_id, user_id)`.
    pub fn term_gpa_records(&self) -> Vec<TermGpaRecord> {
        self.lock().term_gpa.values().cloned().collect()
    }

    /// Stored CPA records ordered by `(program_id, user_id)`.
    pub fn cpa_records(&self) -> Vec<CpaRecord> {
        self.lock().cpa.values().cloned().collect()
    }

    /// Insert a CPA record directly, bypassing write-failure injection.
    pub fn put_cpa(&self, record: CpaRecord) {
        self.lock().cpa.insert(record.key(), record);
    }
}

type Snapshot = (BTreeMap<TermKey, TermGpaRecord>, BTreeMap<CpaKey, CpaRecord>);

/// Open unit of work. Dropped without [`Unit::commit`] (error or panic), it
/// restores the snapshot; either way it closes the transaction.
struct Unit {
    state: Arc<Mutex<State>>,
    snapshot: Option<Snapshot>,
}

impl Unit {
    fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for Unit {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.in_transaction = false;
        if let Some((term_gpa, cpa)) = self.snapshot.take() {
            state.term_gpa = term_gpa;
            state.cpa = cpa;
        }
    }
}

impl State {
    fn spend_write(&mut self) -> StoreResult<()> {
        match self.writes_left {
            Some(0) => Err(StoreError::Backend("injected write failure".into())),
            Some(ref mut n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn field_matches(value: &Option<String>, wanted: &Option<String>) -> bool {
    match wanted {
        Some(w) => value.as_deref() == Some(w.as_str()),
        None => true,
    }
}

impl ScoreSource for MemoryStore {
    fn concluded_scores(&mut self, filter: &RecomputeFilter) -> StoreResult<Vec<ScoreRow>> {
        let state = self.lock();
        let mut rows: Vec<ScoreRow> = state
            .scores
            .iter()
            .filter(|r| field_matches(&r.term_id, &filter.term_id))
            .filter(|r| field_matches(&r.program_id, &filter.program_id))
            .filter(|r| {
                filter
                    .school_id
                    .as_deref()
                    .is_none_or(|s| s == r.school_id)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.term_start_date);
        Ok(rows)
    }

    fn program_history(
        &mut self,
        program_id: &str,
        user_ids: &[String],
    ) -> StoreResult<Vec<ScoreRow>> {
        let state = self.lock();
        let mut rows: Vec<ScoreRow> = state
            .scores
            .iter()
            .filter(|r| r.program_id.as_deref() == Some(program_id))
            .filter(|r| user_ids.contains(&r.user_id))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.term_start_date);
        Ok(rows)
    }
}

impl GradeLookup for MemoryStore {
    fn current_grades(&mut self, user_ids: &[String]) -> StoreResult<HashMap<String, String>> {
        let state = self.lock();
        Ok(user_ids
            .iter()
            .filter_map(|u| {
                let grade = state.profiles.get(u)?.grade_id.clone()?;
                Some((u.clone(), grade))
            })
            .collect())
    }
}

impl EnrollmentLookup for MemoryStore {
    fn active_students(&mut self, user_ids: &[String]) -> StoreResult<HashSet<String>> {
        let state = self.lock();
        Ok(user_ids
            .iter()
            .filter(|u| state.profiles.get(*u).is_some_and(|p| p.is_active))
            .cloned()
            .collect())
    }
}

impl GpaStore for MemoryStore {
    fn upsert_term_gpa(&mut self, record: &TermGpaRecord) -> StoreResult<()> {
        let mut state = self.lock();
        state.spend_write()?;
        state.term_gpa.insert(record.key(), record.clone());
        Ok(())
    }
}

impl CpaStore for MemoryStore {
    fn upsert_cpa(&mut self, record: &CpaRecord) -> StoreResult<()> {
        let mut state = self.lock();
        state.spend_write()?;
        state.cpa.insert(record.key(), record.clone());
        Ok(())
    }

    fn query_cpa(&mut self, filter: &RankFilter) -> StoreResult<Vec<CpaRecord>> {
        let state = self.lock();
        Ok(state
            .cpa
            .values()
            .filter(|r| field_matches(&r.grade_id, &filter.grade_id))
            .filter(|r| filter.program_id.as_deref().is_none_or(|p| p == r.program_id))
            .filter(|r| filter.school_id.as_deref().is_none_or(|s| s == r.school_id))
            .cloned()
            .collect())
    }

    fn update_cpa_rank(&mut self, key: &CpaKey, rank: Option<i32>) -> StoreResult<()> {
        let mut state = self.lock();
        state.spend_write()?;
        match state.cpa.get_mut(key) {
            Some(record) => {
                record.rank = rank;
                Ok(())
            }
            None => Err(StoreError::MissingCpa {
                program_id: key.program_id.clone(),
                user_id: key.user_id.clone(),
            }),
        }
    }
}

impl Atomic for MemoryStore {
    fn atomically<T, F>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self) -> StoreResult<T>,
    {
        let unit = {
            let mut state = self.lock();
            if state.in_transaction {
                return Err(StoreError::NestedTransaction);
            }
            state.in_transaction = true;
            Unit {
                state: Arc::clone(&self.state),
                snapshot: Some((state.term_gpa.clone(), state.cpa.clone())),
            }
        };

        let result = f(self);
        if result.is_ok() {
            unit.commit();
        }
        result
    }
}
