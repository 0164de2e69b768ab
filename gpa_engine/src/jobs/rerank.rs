//! Rank-only recompute over stored CPA records.

use std::collections::BTreeSet;

use crate::aggregate::cap_bonus;
use crate::config::EngineSettings;
use crate::filter::RankFilter;
use crate::jobs::JobError;
use crate::rank::rank_cohorts;
use crate::score::CpaRecord;
use crate::store::{Atomic, CpaStore};

/// What a rank-only recompute did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RerankSummary {
    /// CPA records matched by the filter.
    pub records_read: usize,
    /// Records skipped as not studying or without a grade.
    pub records_skipped: usize,
    /// Cohorts re-ranked.
    pub cohorts: usize,
    /// Rank updates written.
    pub ranks_written: usize,
}

/// Cohorts eligible for ranking, limited to the student's cohorts when the
/// filter names one.
fn select_cohorts(records: Vec<CpaRecord>, student_id: Option<&str>) -> Vec<CpaRecord> {
    let Some(student) = student_id else {
        return records;
    };
    let wanted: BTreeSet<(String, Option<String>)> = records
        .iter()
        .filter(|r| r.user_id == student)
        .map(|r| (r.program_id.clone(), r.grade_id.clone()))
        .collect();
    records
        .into_iter()
        .filter(|r| wanted.contains(&(r.program_id.clone(), r.grade_id.clone())))
        .collect()
}

/// Recompute CPA ranks from stored CPA values without touching scores.
///
/// The ranking score is `cpa + bonus_cpa` capped at `settings.bonus_cap`, so
/// a changed cap takes effect without a score recompute. Records that are not
/// studying or have no grade are left untouched. With `student_id` set, every
/// cohort that student belongs to is re-ranked in full. All rank updates
/// commit together.
pub fn run_rank_recompute<S>(
    store: &mut S,
    filter: &RankFilter,
    settings: &EngineSettings,
) -> Result<RerankSummary, JobError>
where
    S: CpaStore + Atomic,
{
    let filter = filter.clone().normalize();
    let span = tracing::info_span!(
        "rank_recompute",
        grade_id = filter.grade_id.as_deref(),
        program_id = filter.program_id.as_deref(),
        school_id = filter.school_id.as_deref(),
        student_id = filter.student_id.as_deref(),
    );
    let _enter = span.enter();

    let records = store.query_cpa(&filter).map_err(|source| {
        tracing::error!(error = %source, %filter, "CPA query failed");
        JobError::Source {
            filter: filter.to_string(),
            source,
        }
    })?;
    let records = select_cohorts(records, filter.student_id.as_deref());
    let mut summary = RerankSummary {
        records_read: records.len(),
        ..Default::default()
    };
    if records.is_empty() {
        tracing::info!(%filter, "no CPA records to rank");
        return Ok(summary);
    }

    let (eligible, skipped): (Vec<CpaRecord>, Vec<CpaRecord>) = records
        .into_iter()
        .partition(|r| r.is_studying && r.grade_id.is_some());
    summary.records_skipped = skipped.len();

    let ranks = rank_cohorts(eligible.iter().filter_map(|r| {
        let grade = r.grade_id.as_deref()?;
        let score = cap_bonus(r.cpa, r.bonus_cpa, settings.bonus_cap);
        Some(((r.program_id.as_str(), grade), r.key(), score))
    }));
    summary.cohorts = eligible
        .iter()
        .map(|r| (r.program_id.as_str(), r.grade_id.as_deref()))
        .collect::<BTreeSet<_>>()
        .len();

    summary.ranks_written = store
        .atomically(|tx| {
            let mut written = 0;
            for record in &eligible {
                let key = record.key();
                let rank = ranks.get(&key).copied();
                tx.update_cpa_rank(&key, rank).inspect_err(|e| {
                    tracing::error!(error = %e, user_id = %key.user_id, program_id = %key.program_id, "rank update failed");
                })?;
                written += 1;
            }
            Ok(written)
        })
        .map_err(|source| {
            tracing::error!(error = %source, %filter, "rank recompute rolled back");
            JobError::Persistence {
                filter: filter.to_string(),
                source,
            }
        })?;

    tracing::info!(
        records = summary.records_read,
        cohorts = summary.cohorts,
        ranks = summary.ranks_written,
        "rank recompute committed"
    );
    Ok(summary)
}
