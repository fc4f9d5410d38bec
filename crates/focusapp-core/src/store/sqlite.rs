use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::SessionStore;
use crate::error::{DatabaseError, StoreError};
use crate::session::{NewSession, Session};
use crate::storage::Database;

/// [`SessionStore`] over the local SQLite [`Database`].
///
/// rusqlite is synchronous, so every call runs on tokio's blocking pool and
/// the connection is guarded by a mutex.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open the default on-disk database.
    pub fn open() -> Result<Self, DatabaseError> {
        Database::open().map(Self::new)
    }

    pub fn open_memory() -> Result<Self, DatabaseError> {
        Database::open_memory().map(Self::new)
    }

    async fn run<T, F>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().unwrap_or_else(PoisonError::into_inner);
            task(&guard)
        })
        .await?
    }

    pub async fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.run(move |db| Ok(db.kv_get(&key)?)).await
    }

    pub async fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |db| Ok(db.kv_set(&key, &value)?)).await
    }

    pub async fn kv_delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.run(move |db| Ok(db.kv_delete(&key)?)).await
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: NewSession) -> Result<Session, StoreError> {
        self.run(move |db| Ok(db.insert_session(&session)?)).await
    }

    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        let record = session.clone();
        self.run(move |db| {
            if db.update_session(&record)? {
                return Ok(());
            }
            match db.get_session(record.id)? {
                Some(_) => Err(StoreError::AlreadyFinalized { id: record.id }),
                None => Err(StoreError::NotFound { id: record.id }),
            }
        })
        .await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>, StoreError> {
        self.run(move |db| Ok(db.get_session(id)?)).await
    }

    async fn get_active(&self) -> Result<Option<Session>, StoreError> {
        self.run(|db| Ok(db.active_session()?)).await
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        self.run(move |db| Ok(db.sessions_in_range(start, end)?))
            .await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        self.run(move |db| Ok(db.recent_sessions(limit)?)).await
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        self.run(|db| Ok(db.clear_sessions()?)).await
    }
}
