use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::SessionStore;
use crate::error::StoreError;
use crate::session::{NewSession, Session};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    sessions: Vec<Session>,
}

/// In-process store with monotonic ids.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Inner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with already-built records (ids are kept as given).
    pub fn with_sessions(sessions: Vec<Session>) -> Self {
        let next_id = sessions.iter().map(|s| s.id).max().unwrap_or(0);
        Self {
            inner: Mutex::new(Inner { next_id, sessions }),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: NewSession) -> Result<Session, StoreError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let record = session.into_session(inner.next_id);
        inner.sessions.push(record.clone());
        Ok(record)
    }

    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let slot = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or(StoreError::NotFound { id: session.id })?;
        if slot.end_time.is_some() {
            return Err(StoreError::AlreadyFinalized { id: session.id });
        }
        *slot = session.clone();
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>, StoreError> {
        Ok(self.lock().sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn get_active(&self) -> Result<Option<Session>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| s.is_active())
            .max_by_key(|s| (s.start_time, s.id))
            .cloned())
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .lock()
            .sessions
            .iter()
            .filter(|s| s.start_time >= start && s.start_time < end)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let mut sessions = self.lock().sessions.clone();
        sessions.sort_by(|a, b| (b.start_time, b.id).cmp(&(a.start_time, a.id)));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        let removed = inner.sessions.len() as u64;
        inner.sessions.clear();
        Ok(removed)
    }
}
