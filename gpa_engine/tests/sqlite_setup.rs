use diesel::prelude::*;
use gpa_engine::db::connection::connect_sqlite;
use gpa_engine::db::migrate;
use gpa_engine::schema::{class_scores, cumulative_cpa, student_profiles, term_gpa};

mod common;

#[test]
fn sqlite_connection_applies_pragmas() {
    let (db, mut conn) = common::setup_db();
    common::assert_sqlite_pragmas(&mut conn);

    let mut second = connect_sqlite(&db.path).expect("connect second");
    common::assert_sqlite_pragmas(&mut second);
}

#[test]
fn migrations_create_empty_tables_and_rerun_cleanly() {
    let (db, mut conn) = common::setup_db();
    migrate::run_all(&db.path).expect("second run is a no-op");

    let scores: i64 = class_scores::table.count().get_result(&mut conn).unwrap();
    let profiles: i64 = student_profiles::table.count().get_result(&mut conn).unwrap();
    let terms: i64 = term_gpa::table.count().get_result(&mut conn).unwrap();
    let cpas: i64 = cumulative_cpa::table.count().get_result(&mut conn).unwrap();
    assert_eq!((scores, profiles, terms, cpas), (0, 0, 0, 0));
}

#[test]
fn sqlite_url_prefix_is_accepted() {
    let (db, _conn) = common::setup_db();
    let url = format!("sqlite://{}", db.path);
    migrate::run_all(&url).expect("prefixed url");
    let mut conn = connect_sqlite(&url).expect("connect prefixed");
    common::assert_sqlite_pragmas(&mut conn);
}
