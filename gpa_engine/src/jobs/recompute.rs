//! Full score recompute: term GPA and cumulative CPA from concluded scores.
//!
//! The filter bounds which term records are rebuilt. Cumulative records
//! always fold the student's whole program history, so a run narrowed to one
//! term or school never replaces a CPA with a partial average.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::aggregate::{aggregate_cumulative, aggregate_terms, group_by_subject};
use crate::config::EngineSettings;
use crate::filter::RecomputeFilter;
use crate::jobs::JobError;
use crate::rank::rank_cohorts;
use crate::score::{CpaRecord, ScoreRow, TermGpaRecord, TermKey};
use crate::store::{Atomic, CpaStore, EnrollmentLookup, GpaStore, GradeLookup, ScoreSource};

/// What a score recompute run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeSummary {
    /// Concluded rows read from the score source.
    pub rows_read: usize,
    /// Rows dropped because they had no program.
    pub rows_without_program: usize,
    /// Extra rows read to complete program histories for the cumulative step.
    pub history_rows_read: usize,
    /// Distinct `(program, user)` groups aggregated.
    pub students: usize,
    /// Term GPA records upserted.
    pub term_records_written: usize,
    /// Term GPA candidates dropped for having no term.
    pub term_records_discarded: usize,
    /// Term GPA candidates dropped because the same student and term was
    /// produced by another program.
    pub term_records_conflicting: usize,
    /// CPA records upserted.
    pub cpa_records_written: usize,
    /// CPA candidates not written because the student is not enrolled.
    pub cpa_records_skipped: usize,
}

/// Join step: stamp each row with its student's current grade.
///
/// Students missing from `grades` get `None` and end up unranked.
pub fn enrich_grades(rows: &mut [ScoreRow], grades: &HashMap<String, String>) {
    for row in rows {
        row.grade_id = grades.get(&row.user_id).cloned();
    }
}

type ProgramGroups = BTreeMap<String, BTreeMap<String, Vec<ScoreRow>>>;

/// Group by program then user, dropping rows without a program.
/// Returns the groups and the number of dropped rows.
fn group_rows(rows: Vec<ScoreRow>) -> (ProgramGroups, usize) {
    let mut groups = ProgramGroups::new();
    let mut dropped = 0;
    for row in rows {
        let program = match row.program_id.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => {
                dropped += 1;
                continue;
            }
        };
        groups
            .entry(program)
            .or_default()
            .entry(row.user_id.clone())
            .or_default()
            .push(row);
    }
    (groups, dropped)
}

/// Keep one candidate per `(term_id, user_id)`.
///
/// A student with classes in several programs in one term yields one
/// candidate per program. The one with the most learned credit is kept; ties
/// go to the program seen first (lowest program id). Candidates without a
/// term pass through untouched.
fn dedupe_terms(terms: Vec<TermGpaRecord>) -> (Vec<TermGpaRecord>, usize) {
    let mut kept: BTreeMap<TermKey, TermGpaRecord> = BTreeMap::new();
    let mut untermed = Vec::new();
    let mut dropped = 0;
    for record in terms {
        if record.term_id.is_empty() {
            untermed.push(record);
            continue;
        }
        match kept.get_mut(&record.key()) {
            None => {
                kept.insert(record.key(), record);
            }
            Some(current) => {
                dropped += 1;
                let (keep, lose) = if record.learned_credit > current.learned_credit {
                    (record.program_id.clone(), std::mem::replace(current, record))
                } else {
                    (current.program_id.clone(), record)
                };
                tracing::warn!(
                    user_id = %lose.user_id,
                    term_id = %lose.term_id,
                    kept_program = %keep,
                    dropped_program = %lose.program_id,
                    "student has classes in several programs this term; keeping one term GPA"
                );
            }
        }
    }
    let mut out: Vec<TermGpaRecord> = kept.into_values().collect();
    out.extend(untermed);
    (out, dropped)
}

fn assign_ranks(terms: &mut [TermGpaRecord], cpas: &mut [CpaRecord]) {
    let term_ranks = rank_cohorts(terms.iter().enumerate().filter_map(|(i, r)| {
        let grade = r.grade_id.as_deref()?;
        if r.term_id.is_empty() {
            return None;
        }
        Some(((r.term_id.as_str(), grade), i, r.gpa_bonus_point))
    }));
    for (i, record) in terms.iter_mut().enumerate() {
        record.rank = term_ranks.get(&i).copied();
    }

    let cpa_ranks = rank_cohorts(cpas.iter().enumerate().filter_map(|(i, r)| {
        let grade = r.grade_id.as_deref()?;
        r.is_studying
            .then_some(((r.program_id.as_str(), grade), i, r.cpa_bonus_point))
    }));
    for (i, record) in cpas.iter_mut().enumerate() {
        record.rank = cpa_ranks.get(&i).copied();
    }
}

/// Recompute term GPA and cumulative CPA for everything `filter` covers.
///
/// Reads concluded rows, enriches them with current grade and enrollment,
/// aggregates per `(program, user)`, ranks both cohort kinds and upserts the
/// results in a single transaction. Any store failure aborts the whole run.
pub fn run_score_recompute<S>(
    store: &mut S,
    filter: &RecomputeFilter,
    settings: &EngineSettings,
) -> Result<RecomputeSummary, JobError>
where
    S: ScoreSource + GradeLookup + EnrollmentLookup + GpaStore + CpaStore + Atomic,
{
    let filter = filter.clone().normalize();
    let span = tracing::info_span!(
        "score_recompute",
        term_id = filter.term_id.as_deref(),
        program_id = filter.program_id.as_deref(),
        school_id = filter.school_id.as_deref(),
    );
    let _enter = span.enter();

    let mut rows = store
        .concluded_scores(&filter)
        .map_err(|source| {
            tracing::error!(error = %source, %filter, "score source query failed");
            JobError::Source {
                filter: filter.to_string(),
                source,
            }
        })?;
    let mut summary = RecomputeSummary {
        rows_read: rows.len(),
        ..Default::default()
    };

    let users: Vec<String> = rows
        .iter()
        .map(|r| r.user_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let grades = store.current_grades(&users).unwrap_or_else(|e| {
        tracing::warn!(error = %e, %filter, users = users.len(), "grade lookup failed; students stay unranked");
        HashMap::new()
    });
    let active = store.active_students(&users).unwrap_or_else(|e| {
        tracing::warn!(error = %e, %filter, users = users.len(), "enrollment lookup failed; no CPA will be written");
        HashSet::new()
    });
    enrich_grades(&mut rows, &grades);

    let (groups, dropped) = group_rows(rows);
    summary.rows_without_program = dropped;
    if dropped > 0 {
        tracing::debug!(dropped, "skipped rows without program");
    }

    // Narrowed runs only saw part of each history.
    let partial = filter.term_id.is_some() || filter.school_id.is_some();

    let mut terms = Vec::new();
    let mut cpas = Vec::new();
    for (program_id, students) in groups {
        let mut history: HashMap<String, Vec<ScoreRow>> = HashMap::new();
        if partial {
            let user_ids: Vec<String> = students.keys().cloned().collect();
            let rows = store
                .program_history(&program_id, &user_ids)
                .map_err(|source| {
                    tracing::error!(error = %source, %filter, program_id = %program_id, "program history query failed");
                    JobError::Source {
                        filter: filter.to_string(),
                        source,
                    }
                })?;
            summary.history_rows_read += rows.len();
            for row in rows {
                history.entry(row.user_id.clone()).or_default().push(row);
            }
        }

        for (user_id, user_rows) in students {
            summary.students += 1;
            let grade_id = grades.get(&user_id).map(String::as_str);
            let school_id = user_rows
                .first()
                .map(|r| r.school_id.clone())
                .unwrap_or_default();

            let outcome = aggregate_terms(&program_id, &user_id, grade_id, &user_rows, settings);
            terms.extend(outcome.records);
            let subjects = match history.remove(&user_id) {
                Some(full) => group_by_subject(full),
                None => outcome.subjects,
            };
            cpas.push(aggregate_cumulative(
                &program_id,
                &user_id,
                grade_id,
                &school_id,
                subjects,
                active.contains(&user_id),
                settings,
            ));
        }
    }

    let (mut terms, conflicting) = dedupe_terms(terms);
    summary.term_records_conflicting = conflicting;
    assign_ranks(&mut terms, &mut cpas);

    let (written_terms, discarded, written_cpas, skipped) = store
        .atomically(|tx| {
            let (mut written_terms, mut discarded) = (0, 0);
            for record in &terms {
                if record.term_id.is_empty() {
                    tracing::warn!(user_id = %record.user_id, program_id = %record.program_id, "discarding term GPA without term");
                    discarded += 1;
                    continue;
                }
                tx.upsert_term_gpa(record).inspect_err(|e| {
                    tracing::error!(error = %e, user_id = %record.user_id, term_id = %record.term_id, "term GPA upsert failed");
                })?;
                written_terms += 1;
            }

            let (mut written_cpas, mut skipped) = (0, 0);
            for record in &cpas {
                if !record.is_studying {
                    skipped += 1;
                    continue;
                }
                tx.upsert_cpa(record).inspect_err(|e| {
                    tracing::error!(error = %e, user_id = %record.user_id, program_id = %record.program_id, "CPA upsert failed");
                })?;
                written_cpas += 1;
            }
            Ok((written_terms, discarded, written_cpas, skipped))
        })
        .map_err(|source| {
            tracing::error!(error = %source, %filter, "score recompute rolled back");
            JobError::Persistence {
                filter: filter.to_string(),
                source,
            }
        })?;

    summary.term_records_written = written_terms;
    summary.term_records_discarded = discarded;
    summary.cpa_records_written = written_cpas;
    summary.cpa_records_skipped = skipped;

    tracing::info!(
        rows = summary.rows_read,
        students = summary.students,
        term_records = summary.term_records_written,
        cpa_records = summary.cpa_records_written,
        "score recompute committed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{attempt, row};

    fn settings() -> EngineSettings {
        EngineSettings::default()
    }

    #[test]
    fn end_to_end_single_row() {
        let mut store = MemoryStore::new();
        let mut r = row("1", "T1", "Algebra");
        r.credit = 3.0;
        r.weight = Some(10.0);
        r.point = Some(3.5);
        store.add_scores([r]);
        store.set_profile("1", Some("G9"), true);

        let summary =
            run_score_recompute(&mut store, &RecomputeFilter::default(), &settings()).unwrap();
        assert_eq!(summary.term_records_written, 1);
        assert_eq!(summary.cpa_records_written, 1);

        let term = &store.term_gpa_records()[0];
        assert_eq!(term.earned_credit, 3.0);
        assert_eq!(term.learned_credit, 3.0);
        assert_eq!(term.bonus_gpa, 0.0);
        assert_eq!(term.gpa, 3.5);
        assert_eq!(term.gpa_bonus_point, 3.5);
        assert_eq!(term.grade_id.as_deref(), Some("G9"));
        assert_eq!(term.rank, Some(1));

        let cpa = &store.cpa_records()[0];
        assert_eq!(cpa.cpa, 3.5);
        assert_eq!(cpa.rank, Some(1));
    }

    #[test]
    fn non_studying_students_never_write_cpa() {
        let mut store = MemoryStore::new();
        store.add_scores([row("u1", "T1", "Math"), row("u2", "T1", "Math")]);
        store.set_profile("u1", Some("G9"), true);
        store.set_profile("u2", Some("G9"), false);
        store.put_cpa(CpaRecord {
            user_id: "u2".into(),
            program_id: "P1".into(),
            grade_id: Some("G9".into()),
            school_id: "S1".into(),
            cpa: 1.0,
            bonus_cpa: 0.0,
            cpa_bonus_point: 1.0,
            gpa_unweighted: 1.0,
            total_earned_credit: 1.0,
            total_learned_credit: 1.0,
            rank: Some(7),
            is_studying: true,
        });

        let summary =
            run_score_recompute(&mut store, &RecomputeFilter::default(), &settings()).unwrap();
        assert_eq!(summary.cpa_records_written, 1);
        assert_eq!(summary.cpa_records_skipped, 1);

        let stale = store
            .cpa_records()
            .into_iter()
            .find(|r| r.user_id == "u2")
            .unwrap();
        assert_eq!(stale.cpa, 1.0);
        assert_eq!(stale.rank, Some(7));
    }

    #[test]
    fn rows_without_program_or_term_are_dropped() {
        let mut store = MemoryStore::new();
        let mut no_program = row("u1", "T1", "Math");
        no_program.program_id = Some("  ".into());
        let mut no_term = row("u1", "T1", "Art");
        no_term.term_id = None;
        store.add_scores([no_program, no_term, row("u1", "T1", "Music")]);
        store.set_profile("u1", Some("G9"), true);

        let summary =
            run_score_recompute(&mut store, &RecomputeFilter::default(), &settings()).unwrap();
        assert_eq!(summary.rows_without_program, 1);
        assert_eq!(summary.term_records_written, 1);
        assert_eq!(summary.term_records_discarded, 1);
        assert!(store.term_gpa_records().iter().all(|r| !r.term_id.is_empty()));
        // the term-less row still counts toward the cumulative record
        assert_eq!(store.cpa_records()[0].total_learned_credit, 2.0);
    }

    #[test]
    fn students_without_grade_are_unranked() {
        let mut store = MemoryStore::new();
        store.add_scores([row("u1", "T1", "Math"), row("u2", "T1", "Math")]);
        store.set_profile("u1", Some("G9"), true);
        store.set_profile("u2", None, true);

        run_score_recompute(&mut store, &RecomputeFilter::default(), &settings()).unwrap();
        let terms = store.term_gpa_records();
        let u2 = terms.iter().find(|r| r.user_id == "u2").unwrap();
        assert_eq!(u2.rank, None);
        let cpa = store.cpa_records();
        let u2 = cpa.iter().find(|r| r.user_id == "u2").unwrap();
        assert_eq!(u2.rank, None);
    }

    #[test]
    fn cohorts_rank_by_term_and_grade() {
        let mut store = MemoryStore::new();
        store.add_scores([
            attempt("a", "T1", "Math", (2024, 9, 2), 10.0, 4.0),
            attempt("b", "T1", "Math", (2024, 9, 2), 10.0, 4.0),
            attempt("c", "T1", "Math", (2024, 9, 2), 10.0, 3.0),
            attempt("d", "T1", "Math", (2024, 9, 2), 10.0, 1.0),
        ]);
        for u in ["a", "b", "c"] {
            store.set_profile(u, Some("G9"), true);
        }
        store.set_profile("d", Some("G10"), true);

        run_score_recompute(&mut store, &RecomputeFilter::default(), &settings()).unwrap();
        let ranks: BTreeMap<String, Option<i32>> = store
            .term_gpa_records()
            .into_iter()
            .map(|r| (r.user_id, r.rank))
            .collect();
        assert_eq!(ranks["a"], Some(1));
        assert_eq!(ranks["b"], Some(1));
        assert_eq!(ranks["c"], Some(2));
        assert_eq!(ranks["d"], Some(1));
    }

    #[test]
    fn persistence_failure_commits_nothing() {
        let mut store = MemoryStore::new();
        store.add_scores([row("u1", "T1", "Math"), row("u2", "T1", "Math")]);
        store.set_profile("u1", Some("G9"), true);
        store.set_profile("u2", Some("G9"), true);
        store.fail_writes_after(3);

        let err = run_score_recompute(&mut store, &RecomputeFilter::default(), &settings())
            .unwrap_err();
        assert!(matches!(err, JobError::Persistence { .. }));
        assert!(store.term_gpa_records().is_empty());
        assert!(store.cpa_records().is_empty());
    }

    #[test]
    fn filter_limits_scope() {
        let mut store = MemoryStore::new();
        let mut other = row("u2", "T1", "Math");
        other.program_id = Some("P2".into());
        store.add_scores([row("u1", "T1", "Math"), other]);
        store.set_profile("u1", Some("G9"), true);
        store.set_profile("u2", Some("G9"), true);

        let filter = RecomputeFilter {
            program_id: Some("P2".into()),
            ..Default::default()
        };
        let summary = run_score_recompute(&mut store, &filter, &settings()).unwrap();
        assert_eq!(summary.students, 1);
        assert_eq!(store.cpa_records()[0].program_id, "P2");
    }

    #[test]
    fn term_filtered_run_keeps_full_cumulative() {
        let mut store = MemoryStore::new();
        store.add_scores([
            attempt("u1", "T1", "Algebra", (2024, 1, 8), 10.0, 2.0),
            attempt("u1", "T2", "Algebra", (2024, 9, 2), 20.0, 3.0),
            attempt("u1", "T2", "Art", (2024, 9, 2), 10.0, 4.0),
        ]);
        store.set_profile("u1", Some("G9"), true);

        run_score_recompute(&mut store, &RecomputeFilter::default(), &settings()).unwrap();
        let full = store.cpa_records();
        assert_eq!(full[0].cpa, 3.33);
        assert_eq!(full[0].total_learned_credit, 2.0);

        let t1 = RecomputeFilter {
            term_id: Some("T1".into()),
            ..Default::default()
        };
        let summary = run_score_recompute(&mut store, &t1, &settings()).unwrap();
        assert_eq!(summary.rows_read, 1);
        assert_eq!(summary.history_rows_read, 3);
        assert_eq!(summary.term_records_written, 1);
        assert_eq!(store.cpa_records(), full);
    }

    #[test]
    fn school_filtered_run_keeps_full_cumulative() {
        let mut store = MemoryStore::new();
        let mut moved = attempt("u1", "T2", "Art", (2024, 9, 2), 10.0, 4.0);
        moved.school_id = "S2".into();
        store.add_scores([attempt("u1", "T1", "Math", (2024, 1, 8), 10.0, 2.0), moved]);
        store.set_profile("u1", Some("G9"), true);

        let s2 = RecomputeFilter {
            school_id: Some("S2".into()),
            ..Default::default()
        };
        run_score_recompute(&mut store, &s2, &settings()).unwrap();
        let cpa = &store.cpa_records()[0];
        assert_eq!(cpa.cpa, 3.0);
        assert_eq!(cpa.total_learned_credit, 2.0);
    }

    #[test]
    fn one_term_record_per_student_across_programs() {
        let mut store = MemoryStore::new();
        let mut second_program = attempt("u1", "T1", "Art", (2024, 9, 2), 1.0, 1.0);
        second_program.program_id = Some("P2".into());
        store.add_scores([
            attempt("u1", "T1", "Math", (2024, 9, 2), 1.0, 4.0),
            second_program,
            attempt("u2", "T1", "Math", (2024, 9, 2), 1.0, 2.0),
        ]);
        store.set_profile("u1", Some("G9"), true);
        store.set_profile("u2", Some("G9"), true);

        let summary =
            run_score_recompute(&mut store, &RecomputeFilter::default(), &settings()).unwrap();
        assert_eq!(summary.term_records_written, 2);
        assert_eq!(summary.term_records_conflicting, 1);

        let terms = store.term_gpa_records();
        let u1 = terms.iter().find(|r| r.user_id == "u1").unwrap();
        assert_eq!((u1.program_id.as_str(), u1.gpa, u1.rank), ("P1", 4.0, Some(1)));
        let u2 = terms.iter().find(|r| r.user_id == "u2").unwrap();
        assert_eq!(u2.rank, Some(2));
        // each program still keeps its own cumulative record
        assert_eq!(store.cpa_records().len(), 3);
    }

    #[test]
    fn heavier_program_wins_the_term_record() {
        let mut store = MemoryStore::new();
        let mut major = attempt("u1", "T1", "Physics", (2024, 9, 2), 1.0, 2.5);
        major.program_id = Some("P2".into());
        major.credit = 4.0;
        store.add_scores([attempt("u1", "T1", "Math", (2024, 9, 2), 1.0, 4.0), major]);
        store.set_profile("u1", Some("G9"), true);

        run_score_recompute(&mut store, &RecomputeFilter::default(), &settings()).unwrap();
        let terms = store.term_gpa_records();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].program_id, "P2");
        assert_eq!(terms[0].gpa, 2.5);
    }
}
