mod controller;
mod ledger;
mod sampler;

pub use controller::{BreakPolicy, LifecycleState, SessionController, TimerSnapshot};
pub use ledger::{BreakLedger, LedgerCheckpoint};
pub use sampler::ElapsedSampler;
