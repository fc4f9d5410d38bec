//! Session record model.
//!
//! A [`Session`] is created open (no end time) and finalized exactly once.
//! After finalization it is read-only input to the statistics aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted focus or break session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Net active seconds. Present iff `end_time` is present.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub is_break: bool,
}

/// Input to [`SessionStore::insert`](crate::store::SessionStore::insert).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub start_time: DateTime<Utc>,
    pub is_break: bool,
}

impl NewSession {
    pub fn new(start_time: DateTime<Utc>, is_break: bool) -> Self {
        Self {
            start_time,
            is_break,
        }
    }

    /// Attach a store-assigned id.
    pub fn into_session(self, id: i64) -> Session {
        Session {
            id,
            start_time: self.start_time,
            end_time: None,
            duration_seconds: None,
            is_break: self.is_break,
        }
    }
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Completed work session, i.e. one that counts towards statistics.
    pub fn counts_towards_stats(&self) -> bool {
        self.end_time.is_some() && !self.is_break
    }

    /// Return the finalized copy of this session.
    ///
    /// `total_break_ms` is the break time accumulated inside the session;
    /// the result never goes below zero even if the clock stepped backwards.
    pub fn finalized(&self, end_time: DateTime<Utc>, total_break_ms: u64) -> Session {
        Session {
            end_time: Some(end_time),
            duration_seconds: Some(net_active_seconds(
                self.start_time,
                end_time,
                total_break_ms,
            )),
            ..self.clone()
        }
    }
}

/// `floor((until - start - break_ms) / 1000)`, clamped at zero.
pub fn net_active_seconds(start: DateTime<Utc>, until: DateTime<Utc>, break_ms: u64) -> u64 {
    let wall_ms = (until - start).num_milliseconds();
    let break_ms = i64::try_from(break_ms).unwrap_or(i64::MAX);
    let active_ms = wall_ms.saturating_sub(break_ms).max(0);
    (active_ms / 1000) as u64
}
