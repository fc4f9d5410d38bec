//! Session store contract and its implementations.
//!
//! - [`MemorySessionStore`]: process-local, used for tests and previews
//! - [`SqliteSessionStore`]: the on-device database
//! - [`RemoteSessionStore`]: REST backend with an explicit auth token

mod memory;
mod remote;
mod sqlite;

pub use memory::MemorySessionStore;
pub use remote::{RemoteConfig, RemoteSessionStore};
pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::session::{NewSession, Session};

/// Durable record of sessions.
///
/// Only single-record atomicity is assumed. Every method may suspend on I/O.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session and return it with its assigned id.
    async fn insert(&self, session: NewSession) -> Result<Session, StoreError>;

    /// Overwrite an existing record by id.
    ///
    /// A record that already carries an end time is never rewritten:
    /// implementations return [`StoreError::AlreadyFinalized`] instead.
    async fn update(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>, StoreError>;

    /// Most recent session (by start time) with no end time.
    async fn get_active(&self) -> Result<Option<Session>, StoreError>;

    /// Sessions whose start time lies in `[start, end)`, in no particular order.
    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError>;

    /// Newest sessions first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StoreError>;

    /// Delete every session. Returns the number of rows removed.
    async fn clear(&self) -> Result<u64, StoreError>;
}
