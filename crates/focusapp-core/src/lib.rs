//! # Focusapp Core Library
//!
//! Session lifecycle and statistics engine for the Focusapp focus timer.
//! Every operation is reachable from the standalone CLI binary; display
//! layers sit on top of the same library.
//!
//! ## Architecture
//!
//! - **Timer**: an explicit state machine (`Idle`, `Running`, `OnBreak`,
//!   `Ended`) that derives elapsed time from the wall clock and a break
//!   ledger, plus an optional sampler task for live display
//! - **Store**: async session persistence (SQLite, in-memory, REST)
//! - **Stats**: per-day and per-hour totals of completed work sessions
//! - **Clock**: replaceable time source with calendar conventions
//!
//! ## Key Components
//!
//! - [`SessionController`]: start / toggle break / end
//! - [`SessionStore`]: persistence contract
//! - [`StatsAggregator`]: weekly and hourly statistics
//! - [`Config`]: TOML configuration

pub mod clock;
pub mod error;
pub mod session;
pub mod stats;
pub mod storage;
pub mod store;
pub mod timer;

pub use clock::{Calendar, Clock, ManualClock, SystemClock, Zone};
pub use error::{ConfigError, CoreError, DatabaseError, Result, SessionError, StoreError};
pub use session::{NewSession, Session};
pub use stats::{DailyTotals, HourlyTotals, StatsAggregator, StatsView};
pub use storage::{Config, Database};
pub use store::{MemorySessionStore, RemoteConfig, RemoteSessionStore, SessionStore, SqliteSessionStore};
pub use timer::{
    BreakLedger, BreakPolicy, ElapsedSampler, LedgerCheckpoint, LifecycleState, SessionController,
    TimerSnapshot,
};
