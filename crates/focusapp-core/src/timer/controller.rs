//! Session lifecycle controller.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> OnBreak -> Ended -> (Idle | Running)
//! ```
//!
//! `Ended` is terminal for the session record it holds; a new `start()` is
//! accepted from it just as from `Idle`.
//!
//! Mutating operations are serialized by an async operation lock and only
//! touch in-memory state after the store call succeeded. When the store and
//! the in-memory phase disagree (a finalization that committed but was never
//! acknowledged, or a session ended by another process), the persisted record
//! wins. Reads
//! ([`SessionController::elapsed_active_seconds`],
//! [`SessionController::snapshot`]) take a short synchronous lock and can be
//! called from any thread at any time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ledger::{BreakLedger, LedgerCheckpoint};
use crate::clock::Clock;
use crate::error::{SessionError, StoreError};
use crate::session::{net_active_seconds, NewSession, Session};
use crate::store::SessionStore;

/// How breaks are modelled. A deployment picks one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakPolicy {
    /// Breaks are a toggle inside a work session; break time is subtracted
    /// from that session's duration. `start(true)` is rejected.
    #[default]
    InSession,
    /// Breaks are their own session rows created with `start(true)`.
    /// `toggle_break()` is rejected.
    SeparateSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Running,
    OnBreak,
    /// A session was just finalized.
    Ended,
}

impl LifecycleState {
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::OnBreak)
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Active { session: Session, ledger: BreakLedger },
    Ended(Session),
}

impl Phase {
    fn state(&self) -> LifecycleState {
        match self {
            Phase::Idle => LifecycleState::Idle,
            Phase::Active { ledger, .. } if ledger.on_break => LifecycleState::OnBreak,
            Phase::Active { .. } => LifecycleState::Running,
            Phase::Ended(_) => LifecycleState::Ended,
        }
    }
}

/// What the store holds for a session the controller believes is active.
enum Persisted {
    Open,
    Finalized(Session),
    Missing,
}

/// Point-in-time view for the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: LifecycleState,
    pub session: Option<Session>,
    pub elapsed_seconds: u64,
    pub break_ledger: BreakLedger,
    pub at: DateTime<Utc>,
}

/// Owns the state machine for at most one active session.
pub struct SessionController {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    policy: BreakPolicy,
    op_lock: tokio::sync::Mutex<()>,
    phase: Mutex<Phase>,
}

impl SessionController {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy: BreakPolicy::default(),
            op_lock: tokio::sync::Mutex::new(()),
            phase: Mutex::new(Phase::Idle),
        }
    }

    pub fn with_policy(mut self, policy: BreakPolicy) -> Self {
        self.policy = policy;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn policy(&self) -> BreakPolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn state(&self) -> LifecycleState {
        self.phase().state()
    }

    /// The open session, or the one that was just finalized.
    pub fn current_session(&self) -> Option<Session> {
        match &*self.phase() {
            Phase::Idle => None,
            Phase::Active { session, .. } => Some(session.clone()),
            Phase::Ended(session) => Some(session.clone()),
        }
    }

    /// Break ledger of the active session.
    pub fn break_ledger(&self) -> Option<BreakLedger> {
        match &*self.phase() {
            Phase::Active { ledger, .. } => Some(*ledger),
            _ => None,
        }
    }

    /// Break ledger tagged with its session id, for [`recover`](Self::recover)
    /// in a later process.
    pub fn checkpoint(&self) -> Option<LedgerCheckpoint> {
        self.active().map(|(session, ledger)| LedgerCheckpoint {
            session_id: session.id,
            ledger,
        })
    }

    /// Net active seconds of the current session as of `clock.now()`.
    ///
    /// 0 when idle; the persisted duration right after `end()`.
    pub fn elapsed_active_seconds(&self) -> u64 {
        let now = self.clock.now();
        elapsed_in(&self.phase(), now)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let now = self.clock.now();
        let phase = self.phase().clone();
        let (session, break_ledger) = match &phase {
            Phase::Idle => (None, BreakLedger::default()),
            Phase::Active { session, ledger } => (Some(session.clone()), *ledger),
            Phase::Ended(session) => (Some(session.clone()), BreakLedger::default()),
        };
        TimerSnapshot {
            state: phase.state(),
            elapsed_seconds: elapsed_in(&phase, now),
            session,
            break_ledger,
            at: now,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Open a new work (`is_break = false`) or break session.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyActive`] if a session is open here or in the store
    /// - [`SessionError::InvalidState`] if the break policy forbids break rows
    /// - [`SessionError::Store`] if the store fails; state is left untouched
    pub async fn start(&self, is_break: bool) -> Result<Session, SessionError> {
        let _op = self.op_lock.lock().await;

        if is_break && self.policy == BreakPolicy::InSession {
            warn!("rejected break session under in-session break policy");
            return Err(SessionError::InvalidState {
                reason: "break sessions are disabled; toggle a break inside a work session".into(),
            });
        }
        let store_active = self.store.get_active().await?;
        if let Some(id) = self.active_id() {
            if store_active.as_ref().map(|s| s.id) == Some(id) {
                warn!(id, "start rejected: session already active");
                return Err(SessionError::AlreadyActive { id });
            }
            if let Persisted::Open = self.settle(id).await? {
                warn!(id, "start rejected: session still open in the store");
                return Err(SessionError::AlreadyActive { id });
            }
        }
        if let Some(active) = store_active {
            warn!(id = active.id, "start rejected: store has an open session");
            return Err(SessionError::AlreadyActive { id: active.id });
        }

        let now = self.clock.now();
        let session = self.store.insert(NewSession::new(now, is_break)).await?;

        self.set_phase(Phase::Active {
            session: session.clone(),
            ledger: BreakLedger::default(),
        });
        info!(id = session.id, is_break, "session started");
        Ok(session)
    }

    /// Enter or leave a break inside the active work session.
    ///
    /// # Errors
    /// - [`SessionError::NoActiveSession`] if nothing is running
    /// - [`SessionError::InvalidState`] on a break-typed session, or when the
    ///   policy models breaks as separate sessions
    pub async fn toggle_break(&self) -> Result<LifecycleState, SessionError> {
        let _op = self.op_lock.lock().await;
        let now = self.clock.now();
        let policy = self.policy;

        let mut phase = self.phase();
        let Phase::Active { session, ledger } = &mut *phase else {
            return Err(SessionError::NoActiveSession);
        };
        if session.is_break {
            return Err(SessionError::InvalidState {
                reason: format!("session {} is a break session", session.id),
            });
        }
        if policy == BreakPolicy::SeparateSession {
            return Err(SessionError::InvalidState {
                reason: "in-session breaks are disabled; start a break session instead".into(),
            });
        }

        *ledger = ledger.toggled(now);
        let state = phase.state();
        debug!(?state, "break toggled");
        Ok(state)
    }

    /// Finalize the active session.
    ///
    /// Any open break is closed first. On store failure the session stays
    /// active so the call can simply be retried. If the store already holds
    /// an end time for the session (an earlier call committed, then was
    /// cancelled), that record is adopted and returned unchanged.
    pub async fn end(&self) -> Result<Session, SessionError> {
        let _op = self.op_lock.lock().await;

        let (session, ledger) = self.active().ok_or(SessionError::NoActiveSession)?;
        match self.settle(session.id).await? {
            Persisted::Open => {}
            Persisted::Finalized(done) => return Ok(done),
            Persisted::Missing => return Err(StoreError::NotFound { id: session.id }.into()),
        }

        let now = self.clock.now();
        let ledger = ledger.end_break(now);
        let finalized = session.finalized(now, ledger.total_break_ms);

        match self.store.update(&finalized).await {
            Ok(()) => {}
            Err(StoreError::AlreadyFinalized { id }) => {
                return match self.settle(id).await? {
                    Persisted::Finalized(done) => Ok(done),
                    Persisted::Open => Err(StoreError::AlreadyFinalized { id }.into()),
                    Persisted::Missing => Err(StoreError::NotFound { id }.into()),
                };
            }
            Err(e) => return Err(e.into()),
        }

        self.set_phase(Phase::Ended(finalized.clone()));
        info!(
            id = finalized.id,
            duration_seconds = finalized.duration_seconds,
            total_break_ms = ledger.total_break_ms,
            "session ended"
        );
        Ok(finalized)
    }

    /// Leave `Ended` for `Idle`. No-op in any other state.
    pub fn acknowledge(&self) {
        let mut phase = self.phase();
        if matches!(*phase, Phase::Ended(_)) {
            *phase = Phase::Idle;
        }
    }

    /// Re-read the active session from the store and leave the active
    /// states if it was finalized or deleted elsewhere.
    pub async fn refresh(&self) -> Result<LifecycleState, SessionError> {
        let _op = self.op_lock.lock().await;
        if let Some(id) = self.active_id() {
            self.settle(id).await?;
        }
        Ok(self.state())
    }

    /// Adopt the store's open session, e.g. after a restart.
    ///
    /// `saved` restores break accounting captured earlier with
    /// [`checkpoint`](Self::checkpoint). It is ignored unless it was taken
    /// for the session being adopted; without it the session resumes with no
    /// recorded break time. Returns the adopted session, or `None` if the
    /// store has nothing open.
    pub async fn recover(
        &self,
        saved: Option<LedgerCheckpoint>,
    ) -> Result<Option<Session>, SessionError> {
        let _op = self.op_lock.lock().await;

        if let Some((session, _)) = self.active() {
            return Ok(Some(session));
        }
        let Some(session) = self.store.get_active().await? else {
            return Ok(None);
        };

        let ledger = match saved {
            Some(saved) if saved.session_id == session.id && !session.is_break => {
                saved.ledger.sanitized(session.start_time)
            }
            Some(saved) => {
                debug!(
                    saved_for = saved.session_id,
                    id = session.id,
                    "ignoring break ledger saved for another session"
                );
                BreakLedger::default()
            }
            None => BreakLedger::default(),
        };
        self.set_phase(Phase::Active {
            session: session.clone(),
            ledger,
        });
        info!(id = session.id, restored_break_ms = ledger.total_break_ms, "session recovered");
        Ok(Some(session))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, next: Phase) {
        *self.phase() = next;
    }

    fn active(&self) -> Option<(Session, BreakLedger)> {
        match &*self.phase() {
            Phase::Active { session, ledger } => Some((session.clone(), *ledger)),
            _ => None,
        }
    }

    fn active_id(&self) -> Option<i64> {
        self.active().map(|(session, _)| session.id)
    }

    /// Align the phase with the store's copy of session `id`.
    async fn settle(&self, id: i64) -> Result<Persisted, SessionError> {
        match self.store.get_by_id(id).await? {
            Some(session) if session.is_active() => Ok(Persisted::Open),
            Some(session) => {
                info!(id, end_time = ?session.end_time, "adopting end time recorded by the store");
                self.set_phase(Phase::Ended(session.clone()));
                Ok(Persisted::Finalized(session))
            }
            None => {
                warn!(id, "active session is gone from the store");
                self.set_phase(Phase::Idle);
                Ok(Persisted::Missing)
            }
        }
    }
}

fn elapsed_in(phase: &Phase, now: DateTime<Utc>) -> u64 {
    match phase {
        Phase::Idle => 0,
        Phase::Active { session, ledger } => {
            net_active_seconds(session.start_time, now, ledger.break_ms_at(now))
        }
        Phase::Ended(session) => session.duration_seconds.unwrap_or(0),
    }
}
