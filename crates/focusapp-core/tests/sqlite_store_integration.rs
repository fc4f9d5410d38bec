//! Integration tests for the on-disk SQLite store.
//!
//! Each test opens a database file in a temporary directory, so reopening
//! exercises migrations and persistence across connections.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use focusapp_core::storage::migrations::{get_schema_version, SCHEMA_VERSION};
use focusapp_core::{
    Calendar, Database, LedgerCheckpoint, LifecycleState, ManualClock, NewSession, SessionController,
    SessionStore, SqliteSessionStore, StoreError,
};
use tempfile::TempDir;

fn open(dir: &TempDir) -> SqliteSessionStore {
    SqliteSessionStore::new(Database::open_at(dir.path().join("focusapp.db")).unwrap())
}

#[tokio::test]
async fn test_sessions_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

    let id = {
        let store = open(&dir);
        let open_session = store.insert(NewSession::new(start, false)).await.unwrap();
        store
            .update(&open_session.finalized(start + Duration::seconds(95), 5_000))
            .await
            .unwrap();
        open_session.id
    };

    let store = open(&dir);
    let session = store.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(session.start_time, start);
    assert_eq!(session.duration_seconds, Some(90));
    assert!(!session.is_break);
}

#[tokio::test]
async fn test_finalized_session_is_not_rewritten() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    let open_session = store.insert(NewSession::new(start, false)).await.unwrap();
    let done = open_session.finalized(start + Duration::seconds(30), 0);
    store.update(&done).await.unwrap();

    let late = open_session.finalized(start + Duration::hours(1), 0);
    let err = store.update(&late).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyFinalized { id } if id == open_session.id));

    let ghost = NewSession::new(start, false).into_session(999);
    let err = store.update(&ghost).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { id: 999 }));

    assert_eq!(open(&dir).get_by_id(open_session.id).await.unwrap(), Some(done));
}

#[tokio::test]
async fn test_reopen_keeps_schema_version() {
    let dir = TempDir::new().unwrap();
    drop(open(&dir));
    let db = Database::open_at(dir.path().join("focusapp.db")).unwrap();
    assert_eq!(get_schema_version(db.conn()), SCHEMA_VERSION);
}

#[tokio::test]
async fn test_recent_sessions_are_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let base = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    for hours in [2, 0, 1] {
        store
            .insert(NewSession::new(base + Duration::hours(hours), false))
            .await
            .unwrap();
    }

    let recent = store.list_recent(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].start_time, base + Duration::hours(2));
    assert_eq!(recent[1].start_time, base + Duration::hours(1));
}

#[tokio::test]
async fn test_controller_recovers_from_disk_with_saved_ledger() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
        Calendar::default(),
    ));

    let sqlite = open(&dir);
    let first = SessionController::new(Arc::new(sqlite.clone()), clock.clone());
    let session = first.start(false).await.unwrap();
    clock.advance(Duration::seconds(40));
    first.toggle_break().await.unwrap();
    let checkpoint = first.checkpoint().unwrap();
    sqlite
        .kv_set("break_ledger", &serde_json::to_string(&checkpoint).unwrap())
        .await
        .unwrap();
    drop(first);
    drop(sqlite);

    let sqlite = open(&dir);
    let saved: Option<LedgerCheckpoint> = sqlite
        .kv_get("break_ledger")
        .await
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap());
    let second = SessionController::new(Arc::new(sqlite), clock.clone());
    let recovered = second.recover(saved).await.unwrap().unwrap();
    assert_eq!(recovered.id, session.id);
    assert_eq!(second.state(), LifecycleState::OnBreak);

    clock.advance(Duration::seconds(20));
    let done = second.end().await.unwrap();
    assert_eq!(done.duration_seconds, Some(40));
}

#[tokio::test]
async fn test_clear_removes_everything() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    store.insert(NewSession::new(start, false)).await.unwrap();
    store.insert(NewSession::new(start, true)).await.unwrap();

    assert_eq!(store.clear().await.unwrap(), 2);
    assert!(store.get_active().await.unwrap().is_none());
    assert!(store.list_recent(10).await.unwrap().is_empty());
}
