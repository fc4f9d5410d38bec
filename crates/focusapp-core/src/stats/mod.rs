//! Duration statistics over completed work sessions.
//!
//! The pure bucketing functions work on any slice of sessions; the
//! [`StatsAggregator`] adds the store query and calendar ranges.

mod aggregator;
mod buckets;

pub use aggregator::{StatsAggregator, StatsView};
pub use buckets::{bucket_by_day, bucket_by_hour, DailyTotals, HourlyTotals};
