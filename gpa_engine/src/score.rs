//! Domain types flowing through the engine: concluded score rows in,
//! term GPA and cumulative CPA records out.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Subject level, which decides the bonus a row contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// Regular subject, no bonus.
    #[default]
    Normal,
    /// Honors subject, earns `extra_point_honor`.
    Honors,
    /// Advanced-Placement subject, earns `extra_point_advanced`.
    AdvancedPlacement,
}

impl SubjectType {
    /// Parse the stored code. Unknown codes read as [`SubjectType::Normal`].
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "honors" => Self::Honors,
            "advanced_placement" | "ap" => Self::AdvancedPlacement,
            _ => Self::Normal,
        }
    }

    /// Code stored in `class_scores.subject_type`.
    pub fn code(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Honors => "honors",
            Self::AdvancedPlacement => "advanced_placement",
        }
    }
}

/// One student's concluded result in one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    /// Student.
    pub user_id: String,
    /// Term the class ran in. `None` for malformed rows.
    pub term_id: Option<String>,
    /// Program the class belongs to. Rows without one are skipped.
    pub program_id: Option<String>,
    /// School.
    pub school_id: String,
    /// Current grade of the student, filled by the enrichment step.
    pub grade_id: Option<String>,
    /// Subject name; retakes of the same subject share it.
    pub subject_name: String,
    /// Subject level.
    pub subject_type: SubjectType,
    /// Credit of the class.
    pub credit: f64,
    /// Weight in the GPA average. Absent or zero means "not weighted".
    pub weight: Option<f64>,
    /// Weight as configured on the class before adjustments.
    pub real_weight: Option<f64>,
    /// Grade value on the 0-4 scale.
    pub point: Option<f64>,
    /// Whether the class was passed.
    pub is_pass: bool,
    /// Whether the class counts toward GPA.
    pub is_calculate_gpa: bool,
    /// Bonus granted for an honors subject.
    pub extra_point_honor: f64,
    /// Bonus granted for an advanced-placement subject.
    pub extra_point_advanced: f64,
    /// Start date of the term, used to order retakes.
    pub term_start_date: NaiveDate,
}

impl ScoreRow {
    /// Bonus this row contributes according to its subject type.
    pub fn bonus(&self) -> f64 {
        match self.subject_type {
            SubjectType::Honors => self.extra_point_honor,
            SubjectType::AdvancedPlacement => self.extra_point_advanced,
            SubjectType::Normal => 0.0,
        }
    }

    /// Weight with a missing value read as zero.
    pub fn weight_or_zero(&self) -> f64 {
        self.weight.unwrap_or(0.0)
    }

    /// Point with a missing value read as zero.
    pub fn point_or_zero(&self) -> f64 {
        self.point.unwrap_or(0.0)
    }

    /// True when the row carries a usable (present, non-zero) weight.
    pub fn has_weight(&self) -> bool {
        matches!(self.weight, Some(w) if w != 0.0)
    }
}

/// Term GPA of one student, unique per `(term_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermGpaRecord {
    /// Student.
    pub user_id: String,
    /// Term. Empty when the source rows had no term; such records are never stored.
    pub term_id: String,
    /// Program.
    pub program_id: String,
    /// Current grade, `None` when the student has no grade (then unranked).
    pub grade_id: Option<String>,
    /// School.
    pub school_id: String,
    /// Credit of passed classes.
    pub earned_credit: f64,
    /// Credit of all classes taken.
    pub learned_credit: f64,
    /// Sum of honors/AP bonuses.
    pub bonus_gpa: f64,
    /// Weighted average, rounded to 2 decimals.
    pub gpa: f64,
    /// `gpa + bonus_gpa`, capped.
    pub gpa_bonus_point: f64,
    /// Dense rank within `(term_id, grade_id)`.
    pub rank: Option<i32>,
    /// Who produced the record.
    pub created_by: String,
}

/// Natural key of a [`TermGpaRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermKey {
    /// Term.
    pub term_id: String,
    /// Student.
    pub user_id: String,
}

impl TermGpaRecord {
    /// Natural key used for upserts.
    pub fn key(&self) -> TermKey {
        TermKey {
            term_id: self.term_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// Cumulative CPA of one student in one program, unique per `(program_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpaRecord {
    /// Student.
    pub user_id: String,
    /// Program.
    pub program_id: String,
    /// Current grade, `None` when unknown (then unranked).
    pub grade_id: Option<String>,
    /// School.
    pub school_id: String,
    /// Weighted average over deduplicated subjects, rounded to 2 decimals.
    pub cpa: f64,
    /// Sum of honors/AP bonuses of counted rows.
    pub bonus_cpa: f64,
    /// `cpa + bonus_cpa`, capped.
    pub cpa_bonus_point: f64,
    /// Plain average of points, rounded to 2 decimals.
    pub gpa_unweighted: f64,
    /// Credit of passed, counted classes.
    pub total_earned_credit: f64,
    /// Credit of counted classes.
    pub total_learned_credit: f64,
    /// Dense rank within `(program_id, grade_id)`.
    pub rank: Option<i32>,
    /// Whether the student is currently enrolled.
    pub is_studying: bool,
}

/// Natural key of a [`CpaRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpaKey {
    /// Program.
    pub program_id: String,
    /// Student.
    pub user_id: String,
}

impl CpaRecord {
    /// Natural key used for upserts and rank updates.
    pub fn key(&self) -> CpaKey {
        CpaKey {
            program_id: self.program_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}
