//! Integration tests for the session lifecycle.
//!
//! Drives the controller against in-memory and deliberately failing stores
//! with a manual clock, covering break accounting, exclusivity, retries
//! after store failures and concurrent callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use focusapp_core::{
    BreakPolicy, Calendar, LifecycleState, ManualClock, MemorySessionStore, NewSession, Session,
    SessionController, SessionError, SessionStore, StoreError,
};
use proptest::prelude::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

fn setup(policy: BreakPolicy) -> (Arc<SessionController>, Arc<ManualClock>, Arc<MemorySessionStore>) {
    let clock = Arc::new(ManualClock::new(t0(), Calendar::default()));
    let store = Arc::new(MemorySessionStore::new());
    let controller =
        Arc::new(SessionController::new(store.clone(), clock.clone()).with_policy(policy));
    (controller, clock, store)
}

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemorySessionStore,
    fail_insert: AtomicBool,
    fail_update: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Storage("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn insert(&self, session: NewSession) -> Result<Session, StoreError> {
        Self::check(&self.fail_insert)?;
        self.inner.insert(session).await
    }

    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        Self::check(&self.fail_update)?;
        self.inner.update(session).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn get_active(&self) -> Result<Option<Session>, StoreError> {
        self.inner.get_active().await
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        self.inner.query_range(start, end).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        self.inner.list_recent(limit).await
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        self.inner.clear().await
    }
}

/// Memory store whose `update` commits immediately but only returns after a
/// delay, like a server whose response is slow to arrive.
struct LateAckStore {
    inner: MemorySessionStore,
    ack_delay: std::time::Duration,
}

#[async_trait]
impl SessionStore for LateAckStore {
    async fn insert(&self, session: NewSession) -> Result<Session, StoreError> {
        self.inner.insert(session).await
    }

    async fn update(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.update(session).await?;
        tokio::time::sleep(self.ack_delay).await;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>, StoreError> {
        self.inner.get_by_id(id).await
    }

    async fn get_active(&self) -> Result<Option<Session>, StoreError> {
        self.inner.get_active().await
    }

    async fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        self.inner.query_range(start, end).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        self.inner.list_recent(limit).await
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        self.inner.clear().await
    }
}

fn late_ack_setup() -> (SessionController, Arc<ManualClock>, Arc<LateAckStore>) {
    let clock = Arc::new(ManualClock::new(t0(), Calendar::default()));
    let store = Arc::new(LateAckStore {
        inner: MemorySessionStore::new(),
        ack_delay: std::time::Duration::from_millis(200),
    });
    let controller = SessionController::new(store.clone(), clock.clone());
    (controller, clock, store)
}

#[tokio::test]
async fn test_work_session_with_one_break() {
    let (controller, clock, store) = setup(BreakPolicy::InSession);

    let session = controller.start(false).await.unwrap();
    clock.advance(Duration::seconds(10));
    controller.toggle_break().await.unwrap();
    clock.advance(Duration::seconds(30));
    controller.toggle_break().await.unwrap();
    clock.advance(Duration::seconds(10));
    let done = controller.end().await.unwrap();

    assert_eq!(done.duration_seconds, Some(20));
    assert_eq!(done.end_time, Some(t0() + Duration::seconds(50)));

    let stored = store.get_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(stored, done);
    assert!(store.get_active().await.unwrap().is_none());
}

#[tokio::test]
async fn test_break_session_records_wall_time() {
    let (controller, clock, store) = setup(BreakPolicy::SeparateSession);

    let session = controller.start(true).await.unwrap();
    assert!(session.is_break);
    clock.advance(Duration::seconds(15));
    let done = controller.end().await.unwrap();

    assert_eq!(done.duration_seconds, Some(15));
    assert!(store.get_by_id(session.id).await.unwrap().unwrap().is_break);
}

#[tokio::test]
async fn test_second_start_is_rejected_while_active() {
    let (controller, _, store) = setup(BreakPolicy::InSession);

    let first = controller.start(false).await.unwrap();
    let err = controller.start(false).await.unwrap_err();

    assert!(matches!(err, SessionError::AlreadyActive { id } if id == first.id));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_start_rejected_when_store_already_has_open_session() {
    let (_, clock, store) = setup(BreakPolicy::InSession);
    let orphan = store.insert(NewSession::new(t0(), false)).await.unwrap();

    let fresh = SessionController::new(store.clone(), clock);
    let err = fresh.start(false).await.unwrap_err();
    assert!(matches!(err, SessionError::AlreadyActive { id } if id == orphan.id));
    assert_eq!(fresh.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn test_start_after_end_opens_a_new_session() {
    let (controller, clock, store) = setup(BreakPolicy::InSession);

    let first = controller.start(false).await.unwrap();
    clock.advance(Duration::seconds(5));
    controller.end().await.unwrap();
    assert_eq!(controller.state(), LifecycleState::Ended);

    let second = controller.start(false).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(controller.state(), LifecycleState::Running);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_end_twice_is_no_active_session_and_leaves_record_alone() {
    let (controller, clock, store) = setup(BreakPolicy::InSession);

    controller.start(false).await.unwrap();
    clock.advance(Duration::seconds(30));
    let done = controller.end().await.unwrap();

    clock.advance(Duration::seconds(30));
    let err = controller.end().await.unwrap_err();
    assert!(matches!(err, SessionError::NoActiveSession));
    assert_eq!(store.get_by_id(done.id).await.unwrap(), Some(done));
}

#[tokio::test]
async fn test_elapsed_after_end_is_the_persisted_duration() {
    let (controller, clock, _) = setup(BreakPolicy::InSession);

    controller.start(false).await.unwrap();
    clock.advance(Duration::milliseconds(12_900));
    controller.end().await.unwrap();
    clock.advance(Duration::hours(2));

    assert_eq!(controller.elapsed_active_seconds(), 12);
    controller.acknowledge();
    assert_eq!(controller.elapsed_active_seconds(), 0);
}

#[tokio::test]
async fn test_failed_start_leaves_idle() {
    let clock = Arc::new(ManualClock::new(t0(), Calendar::default()));
    let store = Arc::new(FlakyStore::default());
    store.fail_insert.store(true, Ordering::SeqCst);
    let controller = SessionController::new(store.clone(), clock);

    let err = controller.start(false).await.unwrap_err();
    assert!(matches!(err, SessionError::Store(StoreError::Storage(_))));
    assert_eq!(controller.state(), LifecycleState::Idle);
    assert!(controller.current_session().is_none());

    store.fail_insert.store(false, Ordering::SeqCst);
    controller.start(false).await.unwrap();
    assert_eq!(controller.state(), LifecycleState::Running);
}

#[tokio::test]
async fn test_failed_end_keeps_session_and_retry_succeeds() {
    let clock = Arc::new(ManualClock::new(t0(), Calendar::default()));
    let store = Arc::new(FlakyStore::default());
    let controller = SessionController::new(store.clone(), clock.clone());

    let session = controller.start(false).await.unwrap();
    clock.advance(Duration::seconds(10));
    controller.toggle_break().await.unwrap();
    clock.advance(Duration::seconds(5));

    store.fail_update.store(true, Ordering::SeqCst);
    let err = controller.end().await.unwrap_err();
    assert!(matches!(err, SessionError::Store(_)));
    assert_eq!(controller.state(), LifecycleState::OnBreak);
    assert!(store.get_active().await.unwrap().is_some());

    store.fail_update.store(false, Ordering::SeqCst);
    clock.advance(Duration::seconds(5));
    let done = controller.end().await.unwrap();
    assert_eq!(done.id, session.id);
    assert_eq!(done.duration_seconds, Some(10));
    assert_eq!(controller.state(), LifecycleState::Ended);
}

#[tokio::test]
async fn test_retried_end_after_cancel_keeps_first_end_time() {
    let (controller, clock, store) = late_ack_setup();
    let session = controller.start(false).await.unwrap();
    clock.advance(Duration::seconds(30));

    let cancelled =
        tokio::time::timeout(std::time::Duration::from_millis(20), controller.end()).await;
    assert!(cancelled.is_err());
    let committed = store.get_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(committed.duration_seconds, Some(30));

    clock.advance(Duration::hours(1));
    let done = controller.end().await.unwrap();
    assert_eq!(done, committed);
    assert_eq!(done.end_time, Some(t0() + Duration::seconds(30)));
    assert_eq!(controller.state(), LifecycleState::Ended);
    assert_eq!(store.get_by_id(session.id).await.unwrap(), Some(committed));
}

#[tokio::test]
async fn test_start_after_cancelled_end_opens_a_new_session() {
    let (controller, clock, store) = late_ack_setup();
    let first = controller.start(false).await.unwrap();
    clock.advance(Duration::seconds(30));

    let cancelled =
        tokio::time::timeout(std::time::Duration::from_millis(20), controller.end()).await;
    assert!(cancelled.is_err());
    assert!(controller.state().is_active());

    let second = controller.start(false).await.unwrap();
    assert_ne!(second.id, first.id);
    let first_stored = store.get_by_id(first.id).await.unwrap().unwrap();
    assert_eq!(first_stored.duration_seconds, Some(30));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_open_exactly_one_session() {
    let (controller, _, store) = setup(BreakPolicy::InSession);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start(false).await })
        })
        .collect();

    let mut started = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => started += 1,
            Err(SessionError::AlreadyActive { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_toggle_racing_end_never_corrupts_duration() {
    let (controller, clock, store) = setup(BreakPolicy::InSession);
    let session = controller.start(false).await.unwrap();
    clock.advance(Duration::seconds(60));

    let toggler = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.toggle_break().await })
    };
    let ender = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.end().await })
    };
    let toggled = toggler.await.unwrap();
    let ended = ender.await.unwrap().unwrap();

    // The clock is frozen, so a break opened before `end` adds nothing.
    assert_eq!(ended.duration_seconds, Some(60));
    if let Err(err) = toggled {
        assert!(matches!(err, SessionError::NoActiveSession));
    }
    assert_eq!(store.get_by_id(session.id).await.unwrap(), Some(ended));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_during_toggles_see_whole_ledgers() {
    let (controller, clock, _) = setup(BreakPolicy::InSession);
    controller.start(false).await.unwrap();
    clock.advance(Duration::seconds(90));

    let done = Arc::new(AtomicBool::new(false));
    let reader = {
        let controller = controller.clone();
        let done = done.clone();
        tokio::task::spawn_blocking(move || {
            let mut reads = 0u64;
            let mut last_elapsed = 0;
            while !done.load(Ordering::SeqCst) || reads == 0 {
                let snap = controller.snapshot();
                let ledger = snap.break_ledger;
                assert_eq!(ledger.on_break, ledger.break_started_at.is_some());
                assert_eq!(snap.state == LifecycleState::OnBreak, ledger.on_break);
                assert!(snap.elapsed_seconds >= last_elapsed);
                last_elapsed = snap.elapsed_seconds;

                let elapsed = controller.elapsed_active_seconds();
                assert!(elapsed >= last_elapsed);
                last_elapsed = elapsed;
                reads += 1;
            }
            (reads, last_elapsed)
        })
    };

    for _ in 0..500 {
        controller.toggle_break().await.unwrap();
        tokio::task::yield_now().await;
    }
    done.store(true, Ordering::SeqCst);
    let (reads, last_elapsed) = reader.await.unwrap();

    assert!(reads > 0);
    // The clock never moves, so breaks add no time and elapsed stays put.
    assert_eq!(last_elapsed, 90);
    assert_eq!(controller.state(), LifecycleState::Running);
}

#[tokio::test]
async fn test_recover_restores_break_accounting() {
    let (first, clock, store) = setup(BreakPolicy::InSession);
    first.start(false).await.unwrap();
    clock.advance(Duration::seconds(20));
    first.toggle_break().await.unwrap();
    clock.advance(Duration::seconds(20));
    let saved = first.checkpoint();

    let second = SessionController::new(store.clone(), clock.clone());
    second.recover(saved).await.unwrap();
    assert_eq!(second.state(), LifecycleState::OnBreak);

    clock.advance(Duration::seconds(10));
    second.toggle_break().await.unwrap();
    clock.advance(Duration::seconds(5));
    let done = second.end().await.unwrap();
    assert_eq!(done.duration_seconds, Some(25));
}

/// Offsets (ms) between successive operations: start, toggles, end.
fn toggle_plan() -> impl Strategy<Value = (Vec<i64>, i64)> {
    (prop::collection::vec(0i64..120_000, 0..12), 0i64..120_000)
}

proptest! {
    #[test]
    fn prop_duration_is_wall_time_minus_breaks((toggles, tail) in toggle_plan()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let (controller, clock, _) = setup(BreakPolicy::InSession);
            controller.start(false).await.unwrap();

            let mut now_ms = 0i64;
            let mut break_ms = 0i64;
            let mut break_from: Option<i64> = None;
            for gap in &toggles {
                now_ms += gap;
                clock.advance(Duration::milliseconds(*gap));
                controller.toggle_break().await.unwrap();
                break_from = match break_from {
                    Some(from) => {
                        break_ms += now_ms - from;
                        None
                    }
                    None => Some(now_ms),
                };
            }
            now_ms += tail;
            clock.advance(Duration::milliseconds(tail));
            if let Some(from) = break_from {
                break_ms += now_ms - from;
            }

            let done = controller.end().await.unwrap();
            let expected = ((now_ms - break_ms).max(0) / 1000) as u64;
            prop_assert_eq!(done.duration_seconds, Some(expected));
            Ok(())
        })?;
    }
}
