//! Core error types for focusapp-core.
//!
//! The hierarchy mirrors the layering of the crate: storage failures are
//! wrapped by the store contract, which is in turn wrapped by the lifecycle
//! controller. Each layer passes the lower error through unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Umbrella error for callers that do not care which layer failed.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("session: {0}")]
    Session(#[from] SessionError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("database: {0}")]
    Database(#[from] DatabaseError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Caller-side failure with no typed variant, such as a CLI argument
    /// that only makes sense together with some other setting.
    #[error("{0}")]
    Custom(String),
}

/// Errors returned by the session lifecycle controller.
#[derive(Error, Debug)]
pub enum SessionError {
    /// `start()` was called while another session is still open.
    #[error("a session is already active (id {id})")]
    AlreadyActive { id: i64 },

    /// `end()` or `toggle_break()` was called with nothing to act on.
    #[error("no active session")]
    NoActiveSession,

    /// The operation is not valid for the active session or the configured
    /// break policy.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    /// Store failure, passed through as-is.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by a [`SessionStore`](crate::store::SessionStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing medium unavailable (I/O, transport, server error).
    #[error("storage unavailable: {0}")]
    Storage(String),

    /// `update` targeted an id the store does not know.
    #[error("session {id} not found")]
    NotFound { id: i64 },

    /// `update` targeted a session whose end time is already recorded.
    #[error("session {id} is already finalized")]
    AlreadyFinalized { id: i64 },

    /// Local database failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// SQLite failures.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("cannot open database {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("schema migration failed: {0}")]
    MigrationFailed(String),

    /// `SQLITE_BUSY` or `SQLITE_LOCKED`; another process holds the file.
    #[error("database is locked")]
    Locked,

    /// A stored row breaks the session record invariants.
    #[error("corrupt session row {id}: {message}")]
    CorruptRow { id: i64, message: String },
}

/// Loading, saving or editing `config.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot load config {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("cannot save config {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("unknown config key: {0}")]
    UnknownKey(String),

    #[error("config parse error: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode::{DatabaseBusy, DatabaseLocked};
        match err.sqlite_error_code() {
            Some(DatabaseBusy | DatabaseLocked) => DatabaseError::Locked,
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.into())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Storage(format!("storage worker failed: {err}"))
    }
}

impl From<String> for CoreError {
    fn from(message: String) -> Self {
        CoreError::Custom(message)
    }
}

impl From<&str> for CoreError {
    fn from(message: &str) -> Self {
        CoreError::Custom(message.to_string())
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
