//! Cumulative CPA across every term of one program.
//!
//! Attempts are grouped per subject; a retaken subject only counts its most
//! recent attempt (see [`resolve_retakes`]).

use indexmap::IndexMap;

use crate::aggregate::{cap_bonus, round2};
use crate::config::EngineSettings;
use crate::score::{CpaRecord, ScoreRow};

/// Group rows by subject name, keeping first-seen subject order.
pub fn group_by_subject(
    rows: impl IntoIterator<Item = ScoreRow>,
) -> IndexMap<String, Vec<ScoreRow>> {
    let mut subjects: IndexMap<String, Vec<ScoreRow>> = IndexMap::new();
    for row in rows {
        subjects.entry(row.subject_name.clone()).or_default().push(row);
    }
    subjects
}

/// Order a subject's attempts chronologically and keep only the latest one.
///
/// Earlier attempts get `weight`, `real_weight` and `point` zeroed, which
/// removes them from every cumulative sum. The sort is stable, so attempts
/// sharing a start date keep their source order and the last one wins.
pub fn resolve_retakes(attempts: &mut [ScoreRow]) {
    attempts.sort_by_key(|r| r.term_start_date);
    if let Some((_latest, earlier)) = attempts.split_last_mut() {
        for superseded in earlier {
            superseded.weight = Some(0.0);
            superseded.real_weight = Some(0.0);
            superseded.point = Some(0.0);
        }
    }
}

#[derive(Debug, Default)]
struct CumulativeTotals {
    earned_credit: f64,
    learned_credit: f64,
    weight: f64,
    weighted_points: f64,
    points: f64,
    point_count: u32,
    bonus: f64,
}

impl CumulativeTotals {
    fn add(&mut self, row: &ScoreRow) {
        if !row.has_weight() {
            return;
        }
        self.learned_credit += row.credit;
        if row.is_pass {
            self.earned_credit += row.credit;
        }
        if row.is_calculate_gpa {
            let w = row.weight_or_zero();
            let p = row.point_or_zero();
            self.weight += w;
            self.weighted_points += p * w;
            self.points += p;
            self.point_count += 1;
            self.bonus += row.bonus();
        }
    }

    fn cpa(&self) -> f64 {
        if self.weight <= 0.0 {
            0.0
        } else {
            round2(self.weighted_points / self.weight.max(1.0))
        }
    }

    fn gpa_unweighted(&self) -> f64 {
        round2(self.points / f64::from(self.point_count.max(1)))
    }
}

/// Fold a student's subject-grouped rows across all terms into one CPA candidate.
pub fn aggregate_cumulative(
    program_id: &str,
    user_id: &str,
    grade_id: Option<&str>,
    school_id: &str,
    subjects: IndexMap<String, Vec<ScoreRow>>,
    is_studying: bool,
    settings: &EngineSettings,
) -> CpaRecord {
    let mut totals = CumulativeTotals::default();
    for (_subject, mut attempts) in subjects {
        resolve_retakes(&mut attempts);
        for row in &attempts {
            totals.add(row);
        }
    }

    let cpa = totals.cpa();
    CpaRecord {
        user_id: user_id.to_string(),
        program_id: program_id.to_string(),
        grade_id: grade_id.map(str::to_string),
        school_id: school_id.to_string(),
        cpa,
        bonus_cpa: totals.bonus,
        cpa_bonus_point: cap_bonus(cpa, totals.bonus, settings.bonus_cap),
        gpa_unweighted: totals.gpa_unweighted(),
        total_earned_credit: totals.earned_credit,
        total_learned_credit: totals.learned_credit,
        rank: None,
        is_studying,
    }
}
