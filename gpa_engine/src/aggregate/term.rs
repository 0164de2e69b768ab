//! Per-term GPA for one student in one program.

use indexmap::IndexMap;

use crate::aggregate::cumulative::group_by_subject;
use crate::aggregate::{cap_bonus, round2};
use crate::config::EngineSettings;
use crate::score::{ScoreRow, TermGpaRecord};

/// Result of aggregating one student's rows in one program.
#[derive(Debug, Clone, Default)]
pub struct TermOutcome {
    /// One candidate per term, in first-seen (chronological) order.
    /// Rows without a term produce a candidate with an empty `term_id`.
    pub records: Vec<TermGpaRecord>,
    /// Every row of the student grouped by subject name, for the cumulative step.
    pub subjects: IndexMap<String, Vec<ScoreRow>>,
}

#[derive(Debug, Default)]
struct TermTotals {
    learned_credit: f64,
    earned_credit: f64,
    bonus: f64,
    weight: f64,
    weighted_points: f64,
}

impl TermTotals {
    fn add(&mut self, row: &ScoreRow) {
        self.learned_credit += row.credit;
        if row.is_pass {
            self.earned_credit += row.credit;
        }
        self.bonus += row.bonus();
        if row.is_calculate_gpa {
            let w = row.weight_or_zero();
            self.weight += w;
            self.weighted_points += row.point_or_zero() * w;
        }
    }

    fn gpa(&self) -> f64 {
        if self.weight == 0.0 {
            0.0
        } else {
            round2(self.weighted_points / self.weight)
        }
    }
}

/// Reduce one student's rows into per-term GPA candidates.
///
/// `rows` are the student's rows within `program_id`, ordered by term start
/// date. `grade_id` is the student's current grade from the enrichment step.
pub fn aggregate_terms(
    program_id: &str,
    user_id: &str,
    grade_id: Option<&str>,
    rows: &[ScoreRow],
    settings: &EngineSettings,
) -> TermOutcome {
    let mut terms: IndexMap<&str, (TermTotals, &str)> = IndexMap::new();

    for row in rows {
        let term = row.term_id.as_deref().map(str::trim).unwrap_or("");
        let (totals, _school) = terms
            .entry(term)
            .or_insert_with(|| (TermTotals::default(), row.school_id.as_str()));
        totals.add(row);
    }

    let records = terms
        .into_iter()
        .map(|(term_id, (totals, school_id))| {
            let gpa = totals.gpa();
            TermGpaRecord {
                user_id: user_id.to_string(),
                term_id: term_id.to_string(),
                program_id: program_id.to_string(),
                grade_id: grade_id.map(str::to_string),
                school_id: school_id.to_string(),
                earned_credit: totals.earned_credit,
                learned_credit: totals.learned_credit,
                bonus_gpa: totals.bonus,
                gpa,
                gpa_bonus_point: cap_bonus(gpa, totals.bonus, settings.bonus_cap),
                rank: None,
                created_by: settings.created_by.clone(),
            }
        })
        .collect();

    TermOutcome {
        records,
        subjects: group_by_subject(rows.iter().cloned()),
    }
}
