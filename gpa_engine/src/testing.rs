//! Fixtures shared by unit tests.

use chrono::NaiveDate;

use crate::score::{ScoreRow, SubjectType};

/// A passed, GPA-counted NORMAL row with weight 1 and point 3.0.
pub(crate) fn row(user: &str, term: &str, subject: &str) -> ScoreRow {
    ScoreRow {
        user_id: user.to_string(),
        term_id: Some(term.to_string()),
        program_id: Some("P1".to_string()),
        school_id: "S1".to_string(),
        grade_id: None,
        subject_name: subject.to_string(),
        subject_type: SubjectType::Normal,
        credit: 1.0,
        weight: Some(1.0),
        real_weight: Some(1.0),
        point: Some(3.0),
        is_pass: true,
        is_calculate_gpa: true,
        extra_point_honor: 0.0,
        extra_point_advanced: 0.0,
        term_start_date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
    }
}

/// Same as [`row`] with explicit term start date, weight and point.
pub(crate) fn attempt(
    user: &str,
    term: &str,
    subject: &str,
    start: (i32, u32, u32),
    weight: f64,
    point: f64,
) -> ScoreRow {
    let mut r = row(user, term, subject);
    r.term_start_date = NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap();
    r.weight = Some(weight);
    r.real_weight = Some(weight);
    r.point = Some(point);
    r
}
