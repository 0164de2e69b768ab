//! SQLite connection helpers.
//!
//! Provides [`connect_sqlite`] that opens a connection and applies the PRAGMAs
//! the engine relies on: WAL journaling, foreign_keys=ON, and a 5000ms busy_timeout.
//! The busy timeout matters because a recompute run holds the write lock for
//! its whole transaction.

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

/// Strip an optional `sqlite://` or `sqlite:` scheme, leaving what SQLite opens.
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> anyhow::Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(sqlite_path(database_url))?;

    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::sqlite_path;

    #[test]
    fn scheme_is_optional() {
        assert_eq!(sqlite_path("sqlite://grades.db"), "grades.db");
        assert_eq!(sqlite_path("sqlite:grades.db"), "grades.db");
        assert_eq!(sqlite_path("/tmp/grades.db"), "/tmp/grades.db");
    }
}
