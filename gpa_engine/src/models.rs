//! Diesel models mapping to the database schema.
//!
//! These types mirror the tables defined in the embedded migrations and in
//! [`crate::schema`]:
//! - [`crate::schema::class_scores`]: read model of concluded class scores
//! - [`crate::schema::student_profiles`]: current grade and enrollment state
//! - [`crate::schema::term_gpa`]: one row per `(term_id, user_id)`
//! - [`crate::schema::cumulative_cpa`]: one row per `(program_id, user_id)`
//!
//! Conversions to and from the domain types in [`crate::score`] live here so
//! that the store implementation only deals with queries.

use chrono::NaiveDate;
use diesel::prelude::*;

use crate::schema::*;
use crate::score::{CpaRecord, ScoreRow, SubjectType, TermGpaRecord};

/// A row in [`crate::schema::class_scores`], as read by the score source.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = class_scores, check_for_backend(diesel::sqlite::Sqlite))]
pub struct ClassScore {
    /// Student.
    pub user_id: String,
    /// Term, NULL for malformed rows.
    pub term_id: Option<String>,
    /// Program, NULL rows are skipped by the recompute job.
    pub program_id: Option<String>,
    /// School.
    pub school_id: String,
    /// Subject name.
    pub subject_name: String,
    /// "normal" | "honors" | "advanced_placement".
    pub subject_type: String,
    /// Class credit.
    pub credit: f64,
    /// Optional GPA weight.
    pub weight: Option<f64>,
    /// Optional configured weight.
    pub real_weight: Option<f64>,
    /// Optional 0-4 grade value.
    pub point: Option<f64>,
    /// Passed flag.
    pub is_pass: bool,
    /// Counts toward GPA.
    pub is_calculate_gpa: bool,
    /// Honors bonus.
    pub extra_point_honor: f64,
    /// AP bonus.
    pub extra_point_advanced: f64,
    /// Term start date.
    pub term_start_date: NaiveDate,
}

impl From<ClassScore> for ScoreRow {
    fn from(r: ClassScore) -> Self {
        ScoreRow {
            user_id: r.user_id,
            term_id: r.term_id,
            program_id: r.program_id,
            school_id: r.school_id,
            grade_id: None,
            subject_name: r.subject_name,
            subject_type: SubjectType::from_code(&r.subject_type),
            credit: r.credit,
            weight: r.weight,
            real_weight: r.real_weight,
            point: r.point,
            is_pass: r.is_pass,
            is_calculate_gpa: r.is_calculate_gpa,
            extra_point_honor: r.extra_point_honor,
            extra_point_advanced: r.extra_point_advanced,
            term_start_date: r.term_start_date,
        }
    }
}

/// Insertable form of [`ClassScore`], used by seeding tools and tests.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = class_scores)]
pub struct NewClassScore<'a> {
    /// Class identifier.
    pub class_id: &'a str,
    /// Class status; only "concluded" rows are read.
    pub status: &'a str,
    /// Student.
    pub user_id: &'a str,
    /// Term.
    pub term_id: Option<&'a str>,
    /// Program.
    pub program_id: Option<&'a str>,
    /// School.
    pub school_id: &'a str,
    /// Subject name.
    pub subject_name: &'a str,
    /// Subject type code.
    pub subject_type: &'a str,
    /// Class credit.
    pub credit: f64,
    /// Optional GPA weight.
    pub weight: Option<f64>,
    /// Optional configured weight.
    pub real_weight: Option<f64>,
    /// Optional grade value.
    pub point: Option<f64>,
    /// Passed flag.
    pub is_pass: bool,
    /// Counts toward GPA.
    pub is_calculate_gpa: bool,
    /// Honors bonus.
    pub extra_point_honor: f64,
    /// AP bonus.
    pub extra_point_advanced: f64,
    /// Term start date.
    pub term_start_date: NaiveDate,
}

/// A row in [`crate::schema::student_profiles`].
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = student_profiles, check_for_backend(diesel::sqlite::Sqlite))]
pub struct StudentProfile {
    /// Student.
    pub user_id: String,
    /// Current grade level.
    pub grade_id: Option<String>,
    /// Currently enrolled.
    pub is_active: bool,
}

/// A stored row in [`crate::schema::term_gpa`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = term_gpa, check_for_backend(diesel::sqlite::Sqlite))]
pub struct TermGpaRow {
    /// Stable identifier assigned on first insert.
    pub uuid: String,
    /// Student.
    pub user_id: String,
    /// Term.
    pub term_id: String,
    /// Program.
    pub program_id: String,
    /// Grade at computation time.
    pub grade_id: Option<String>,
    /// School.
    pub school_id: String,
    /// Earned credit.
    pub earned_credit: f64,
    /// Learned credit.
    pub learned_credit: f64,
    /// Bonus sum.
    pub bonus_gpa: f64,
    /// Term GPA.
    pub gpa: f64,
    /// Capped GPA with bonus.
    pub gpa_bonus_point: f64,
    /// Cohort rank.
    pub rank: Option<i32>,
    /// Producer tag.
    pub created_by: String,
}

impl From<TermGpaRow> for TermGpaRecord {
    fn from(r: TermGpaRow) -> Self {
        TermGpaRecord {
            user_id: r.user_id,
            term_id: r.term_id,
            program_id: r.program_id,
            grade_id: r.grade_id,
            school_id: r.school_id,
            earned_credit: r.earned_credit,
            learned_credit: r.learned_credit,
            bonus_gpa: r.bonus_gpa,
            gpa: r.gpa,
            gpa_bonus_point: r.gpa_bonus_point,
            rank: r.rank,
            created_by: r.created_by,
        }
    }
}

/// Upsert payload for [`crate::schema::term_gpa`]; `uuid` is excluded so that
/// the identifier from the first insert survives later runs.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = term_gpa, treat_none_as_null = true)]
pub struct TermGpaChanges<'a> {
    /// Student.
    pub user_id: &'a str,
    /// Term.
    pub term_id: &'a str,
    /// Program.
    pub program_id: &'a str,
    /// Grade.
    pub grade_id: Option<&'a str>,
    /// School.
    pub school_id: &'a str,
    /// Earned credit.
    pub earned_credit: f64,
    /// Learned credit.
    pub learned_credit: f64,
    /// Bonus sum.
    pub bonus_gpa: f64,
    /// Term GPA.
    pub gpa: f64,
    /// Capped GPA with bonus.
    pub gpa_bonus_point: f64,
    /// Cohort rank.
    pub rank: Option<i32>,
    /// Producer tag.
    pub created_by: &'a str,
}

impl<'a> From<&'a TermGpaRecord> for TermGpaChanges<'a> {
    fn from(r: &'a TermGpaRecord) -> Self {
        TermGpaChanges {
            user_id: &r.user_id,
            term_id: &r.term_id,
            program_id: &r.program_id,
            grade_id: r.grade_id.as_deref(),
            school_id: &r.school_id,
            earned_credit: r.earned_credit,
            learned_credit: r.learned_credit,
            bonus_gpa: r.bonus_gpa,
            gpa: r.gpa,
            gpa_bonus_point: r.gpa_bonus_point,
            rank: r.rank,
            created_by: &r.created_by,
        }
    }
}

/// Insert payload for [`crate::schema::term_gpa`]: the changes plus a fresh uuid.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = term_gpa)]
pub struct NewTermGpa<'a> {
    /// Identifier for the row if this upsert inserts it.
    pub uuid: String,
    /// Column values shared with the update path.
    #[diesel(embed)]
    pub changes: TermGpaChanges<'a>,
}

/// A stored row in [`crate::schema::cumulative_cpa`].
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = cumulative_cpa, check_for_backend(diesel::sqlite::Sqlite))]
pub struct CpaRow {
    /// Student.
    pub user_id: String,
    /// Program.
    pub program_id: String,
    /// Grade at computation time.
    pub grade_id: Option<String>,
    /// School.
    pub school_id: String,
    /// Cumulative average.
    pub cpa: f64,
    /// Bonus sum.
    pub bonus_cpa: f64,
    /// Capped CPA with bonus.
    pub cpa_bonus_point: f64,
    /// Unweighted average.
    pub gpa_unweighted: f64,
    /// Earned credit.
    pub total_earned_credit: f64,
    /// Learned credit.
    pub total_learned_credit: f64,
    /// Cohort rank.
    pub rank: Option<i32>,
    /// Enrollment flag at computation time.
    pub is_studying: bool,
}

impl From<CpaRow> for CpaRecord {
    fn from(r: CpaRow) -> Self {
        CpaRecord {
            user_id: r.user_id,
            program_id: r.program_id,
            grade_id: r.grade_id,
            school_id: r.school_id,
            cpa: r.cpa,
            bonus_cpa: r.bonus_cpa,
            cpa_bonus_point: r.cpa_bonus_point,
            gpa_unweighted: r.gpa_unweighted,
            total_earned_credit: r.total_earned_credit,
            total_learned_credit: r.total_learned_credit,
            rank: r.rank,
            is_studying: r.is_studying,
        }
    }
}

/// Upsert payload for [`crate::schema::cumulative_cpa`].
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = cumulative_cpa, treat_none_as_null = true)]
pub struct CpaChanges<'a> {
    /// Student.
    pub user_id: &'a str,
    /// Program.
    pub program_id: &'a str,
    /// Grade.
    pub grade_id: Option<&'a str>,
    /// School.
    pub school_id: &'a str,
    /// Cumulative average.
    pub cpa: f64,
    /// Bonus sum.
    pub bonus_cpa: f64,
    /// Capped CPA with bonus.
    pub cpa_bonus_point: f64,
    /// Unweighted average.
    pub gpa_unweighted: f64,
    /// Earned credit.
    pub total_earned_credit: f64,
    /// Learned credit.
    pub total_learned_credit: f64,
    /// Cohort rank.
    pub rank: Option<i32>,
    /// Enrollment flag.
    pub is_studying: bool,
}

impl<'a> From<&'a CpaRecord> for CpaChanges<'a> {
    fn from(r: &'a CpaRecord) -> Self {
        CpaChanges {
            user_id: &r.user_id,
            program_id: &r.program_id,
            grade_id: r.grade_id.as_deref(),
            school_id: &r.school_id,
            cpa: r.cpa,
            bonus_cpa: r.bonus_cpa,
            cpa_bonus_point: r.cpa_bonus_point,
            gpa_unweighted: r.gpa_unweighted,
            total_earned_credit: r.total_earned_credit,
            total_learned_credit: r.total_learned_credit,
            rank: r.rank,
            is_studying: r.is_studying,
        }
    }
}
