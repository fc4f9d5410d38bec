//! Versioned schema for the session database.
//!
//! Steps run in order on every open; each one bumps the single row in
//! `schema_version`, so a database is only ever moved forward.

use rusqlite::{Connection, Result as SqliteResult};

type Step = fn(&Connection) -> SqliteResult<()>;

/// Ordered `(version, step)` pairs. Append only.
const STEPS: &[(i32, Step)] = &[(1, sessions_and_kv), (2, open_session_index)];

/// Version reached after every step has run.
pub const SCHEMA_VERSION: i32 = 2;

/// Run every step newer than the stored version.
///
/// # Errors
/// Returns the first SQLite error; later steps are not attempted.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);")?;

    let stored = get_schema_version(conn);
    for &(version, step) in STEPS.iter().filter(|(v, _)| *v > stored) {
        step(conn)?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tracing::debug!(version, "applied schema step");
    }
    Ok(())
}

/// Stored version, or 0 for a fresh file.
pub fn get_schema_version(conn: &Connection) -> i32 {
    match conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0)) {
        Ok(version) => version,
        Err(rusqlite::Error::QueryReturnedNoRows) => 0,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read schema_version");
            0
        }
    }
}

fn sessions_and_kv(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            start_time_ms    INTEGER NOT NULL,
            end_time_ms      INTEGER,
            duration_seconds INTEGER,
            is_break         INTEGER NOT NULL DEFAULT 0,
            CHECK ((end_time_ms IS NULL) = (duration_seconds IS NULL)),
            CHECK (duration_seconds IS NULL OR duration_seconds >= 0)
        );

        CREATE TABLE IF NOT EXISTS kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time_ms);",
    )
}

/// Partial index for the open-session lookup.
fn open_session_index(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_sessions_open
            ON sessions(start_time_ms) WHERE end_time_ms IS NULL;",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_sets_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn steps_end_at_schema_version() {
        assert_eq!(STEPS.last().map(|(v, _)| *v), Some(SCHEMA_VERSION));
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn schema_rejects_half_finalized_rows() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO sessions (start_time_ms, end_time_ms, duration_seconds, is_break)
             VALUES (0, 1000, NULL, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
