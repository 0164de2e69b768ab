#![allow(dead_code)]

use chrono::NaiveDate;
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use gpa_engine::db::{connection, migrate};
use gpa_engine::models::{NewClassScore, StudentProfile};
use gpa_engine::schema::{class_scores, student_profiles};
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/grades.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("grades.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

/// Owned class score row for seeding; defaults to a concluded, passed,
/// GPA-counted NORMAL class in program P1 at school S1.
#[derive(Debug, Clone)]
pub struct ScoreSeed {
    pub class_id: String,
    pub status: String,
    pub user_id: String,
    pub term_id: Option<String>,
    pub program_id: Option<String>,
    pub school_id: String,
    pub subject_name: String,
    pub subject_type: String,
    pub credit: f64,
    pub weight: Option<f64>,
    pub point: Option<f64>,
    pub is_pass: bool,
    pub is_calculate_gpa: bool,
    pub extra_point_honor: f64,
    pub extra_point_advanced: f64,
    pub term_start_date: NaiveDate,
}

impl ScoreSeed {
    pub fn new(user: &str, term: &str, subject: &str) -> Self {
        Self {
            class_id: format!("{term}-{subject}"),
            status: "concluded".into(),
            user_id: user.into(),
            term_id: Some(term.into()),
            program_id: Some("P1".into()),
            school_id: "S1".into(),
            subject_name: subject.into(),
            subject_type: "normal".into(),
            credit: 1.0,
            weight: Some(1.0),
            point: Some(3.0),
            is_pass: true,
            is_calculate_gpa: true,
            extra_point_honor: 0.0,
            extra_point_advanced: 0.0,
            term_start_date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
        }
    }

    pub fn scored(mut self, credit: f64, weight: f64, point: f64) -> Self {
        self.credit = credit;
        self.weight = Some(weight);
        self.point = Some(point);
        self
    }

    pub fn started(mut self, y: i32, m: u32, d: u32) -> Self {
        self.term_start_date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        self
    }

    fn as_insert(&self) -> NewClassScore<'_> {
        NewClassScore {
            class_id: &self.class_id,
            status: &self.status,
            user_id: &self.user_id,
            term_id: self.term_id.as_deref(),
            program_id: self.program_id.as_deref(),
            school_id: &self.school_id,
            subject_name: &self.subject_name,
            subject_type: &self.subject_type,
            credit: self.credit,
            weight: self.weight,
            real_weight: self.weight,
            point: self.point,
            is_pass: self.is_pass,
            is_calculate_gpa: self.is_calculate_gpa,
            extra_point_honor: self.extra_point_honor,
            extra_point_advanced: self.extra_point_advanced,
            term_start_date: self.term_start_date,
        }
    }
}

pub fn insert_scores(conn: &mut SqliteConnection, seeds: &[ScoreSeed]) {
    let rows: Vec<NewClassScore<'_>> = seeds.iter().map(ScoreSeed::as_insert).collect();
    diesel::insert_into(class_scores::table)
        .values(&rows)
        .execute(conn)
        .expect("insert scores");
}

pub fn insert_profile(conn: &mut SqliteConnection, user: &str, grade: Option<&str>, active: bool) {
    diesel::insert_into(student_profiles::table)
        .values(StudentProfile {
            user_id: user.into(),
            grade_id: grade.map(str::to_string),
            is_active: active,
        })
        .execute(conn)
        .expect("insert profile");
}
