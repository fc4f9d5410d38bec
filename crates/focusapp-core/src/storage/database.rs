//! SQLite-based session storage.
//!
//! Provides persistent storage for:
//! - Focus and break sessions (open and finalized)
//! - Key-value store for application state
//!
//! Timestamps are stored as millisecond epochs so range queries compare
//! integers rather than strings.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{data_dir, migrations};
use crate::error::DatabaseError;
use crate::session::{NewSession, Session};

const SESSION_COLUMNS: &str = "id, start_time_ms, end_time_ms, duration_seconds, is_break";

/// SQLite database for session storage.
pub struct Database {
    conn: Connection,
}

struct RawSession {
    id: i64,
    start_time_ms: i64,
    end_time_ms: Option<i64>,
    duration_seconds: Option<i64>,
    is_break: bool,
}

impl RawSession {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            start_time_ms: row.get(1)?,
            end_time_ms: row.get(2)?,
            duration_seconds: row.get(3)?,
            is_break: row.get(4)?,
        })
    }

    fn into_session(self) -> Result<Session, DatabaseError> {
        let id = self.id;
        let corrupt = |message: String| DatabaseError::CorruptRow { id, message };

        let start_time = from_epoch_ms(self.start_time_ms)
            .ok_or_else(|| corrupt(format!("start_time_ms {} out of range", self.start_time_ms)))?;
        let end_time = self
            .end_time_ms
            .map(|ms| from_epoch_ms(ms).ok_or_else(|| corrupt(format!("end_time_ms {ms} out of range"))))
            .transpose()?;
        let duration_seconds = self
            .duration_seconds
            .map(|secs| u64::try_from(secs).map_err(|_| corrupt(format!("negative duration {secs}"))))
            .transpose()?;

        if end_time.is_some() != duration_seconds.is_some() {
            return Err(corrupt("end time and duration must be set together".into()));
        }

        Ok(Session {
            id,
            start_time,
            end_time,
            duration_seconds,
            is_break: self.is_break,
        })
    }
}

fn from_epoch_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn to_i64(value: u64) -> Result<i64, DatabaseError> {
    i64::try_from(value)
        .map_err(|_| DatabaseError::QueryFailed(format!("value {value} exceeds SQLite INTEGER range")))
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/focusapp.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created or the
    /// database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let dir = data_dir().map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Self::open_at(dir.join("focusapp.db"))
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %err, "failed to enable WAL mode");
        }
        let db = Self { conn };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open an in-memory database (for tests and previews).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Insert a new open session and return it with its row id.
    pub fn insert_session(&self, session: &NewSession) -> Result<Session, DatabaseError> {
        self.conn.execute(
            "INSERT INTO sessions (start_time_ms, end_time_ms, duration_seconds, is_break)
             VALUES (?1, NULL, NULL, ?2)",
            params![session.start_time.timestamp_millis(), session.is_break],
        )?;
        Ok(session.into_session(self.conn.last_insert_rowid()))
    }

    /// Overwrite an open session by id. Returns `false` if no open row
    /// matched, either because the id is unknown or the row is finalized.
    pub fn update_session(&self, session: &Session) -> Result<bool, DatabaseError> {
        let duration = session.duration_seconds.map(to_i64).transpose()?;
        let changed = self.conn.execute(
            "UPDATE sessions
             SET start_time_ms = ?1,
                 end_time_ms = ?2,
                 duration_seconds = ?3,
                 is_break = ?4
             WHERE id = ?5 AND end_time_ms IS NULL",
            params![
                session.start_time.timestamp_millis(),
                session.end_time.map(|t| t.timestamp_millis()),
                duration,
                session.is_break,
                session.id,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn get_session(&self, id: i64) -> Result<Option<Session>, DatabaseError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                RawSession::from_row,
            )
            .optional()?;
        raw.map(RawSession::into_session).transpose()
    }

    /// Most recent session with no end time.
    pub fn active_session(&self) -> Result<Option<Session>, DatabaseError> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE end_time_ms IS NULL
                     ORDER BY start_time_ms DESC, id DESC
                     LIMIT 1"
                ),
                [],
                RawSession::from_row,
            )
            .optional()?;
        raw.map(RawSession::into_session).transpose()
    }

    /// Sessions with `start <= start_time < end`, oldest first.
    pub fn sessions_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE start_time_ms >= ?1 AND start_time_ms < ?2
             ORDER BY start_time_ms, id"
        ))?;
        let rows = stmt.query_map(
            params![start.timestamp_millis(), end.timestamp_millis()],
            RawSession::from_row,
        )?;
        rows.map(|row| row.map_err(DatabaseError::from)?.into_session())
            .collect()
    }

    /// Newest sessions first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             ORDER BY start_time_ms DESC, id DESC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], RawSession::from_row)?;
        rows.map(|row| row.map_err(DatabaseError::from)?.into_session())
            .collect()
    }

    /// Delete all sessions. Returns the number of rows removed.
    pub fn clear_sessions(&self) -> Result<u64, DatabaseError> {
        let removed = self.conn.execute("DELETE FROM sessions", [])?;
        Ok(removed as u64)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}
