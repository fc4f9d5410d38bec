//! Break accounting for one active work session.
//!
//! [`BreakLedger`] is an immutable value: every transition returns a new
//! ledger, and the controller swaps it in under its phase lock, so readers
//! always see a whole pre- or post-toggle ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakLedger {
    pub on_break: bool,
    /// Only meaningful while `on_break`.
    #[serde(default)]
    pub break_started_at: Option<DateTime<Utc>>,
    /// Sum of all closed break intervals, in milliseconds.
    #[serde(default)]
    pub total_break_ms: u64,
}

impl BreakLedger {
    pub fn begin_break(self, now: DateTime<Utc>) -> Self {
        if self.on_break {
            return self;
        }
        Self {
            on_break: true,
            break_started_at: Some(now),
            total_break_ms: self.total_break_ms,
        }
    }

    pub fn end_break(self, now: DateTime<Utc>) -> Self {
        if !self.on_break {
            return self;
        }
        Self {
            on_break: false,
            break_started_at: None,
            total_break_ms: self.total_break_ms.saturating_add(self.open_break_ms(now)),
        }
    }

    pub fn toggled(self, now: DateTime<Utc>) -> Self {
        if self.on_break {
            self.end_break(now)
        } else {
            self.begin_break(now)
        }
    }

    /// Length of the break in progress, or 0.
    pub fn open_break_ms(&self, now: DateTime<Utc>) -> u64 {
        match (self.on_break, self.break_started_at) {
            (true, Some(started)) => (now - started).num_milliseconds().max(0) as u64,
            _ => 0,
        }
    }

    /// Closed breaks plus the one in progress.
    pub fn break_ms_at(&self, now: DateTime<Utc>) -> u64 {
        self.total_break_ms.saturating_add(self.open_break_ms(now))
    }

    /// Drop inconsistent state (on break without a start time, or a break
    /// that started before the session did).
    pub fn sanitized(self, session_start: DateTime<Utc>) -> Self {
        match (self.on_break, self.break_started_at) {
            (true, Some(started)) if started >= session_start => self,
            (true, _) => Self {
                on_break: false,
                break_started_at: None,
                total_break_ms: self.total_break_ms,
            },
            (false, _) => Self {
                break_started_at: None,
                ..self
            },
        }
    }
}

/// A ledger tagged with the session it belongs to, for carrying break state
/// across process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCheckpoint {
    pub session_id: i64,
    pub ledger: BreakLedger,
}
