//! Calendar bucketing of completed work sessions.
//!
//! Only sessions with an end time and `is_break == false` are counted. Each
//! session lands wholly in the bucket of its start time, even when it runs
//! past midnight or the top of the hour.

use chrono::{Days, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::clock::Calendar;
use crate::session::Session;

/// Seconds per local day key (`YYYY-MM-DD`). Absent keys mean zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyTotals(IndexMap<String, u64>);

/// Seconds per local hour of day (0..=23). Absent keys mean zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HourlyTotals(IndexMap<u32, u64>);

macro_rules! bucket_map {
    ($name:ident, $key:ty) => {
        impl $name {
            pub fn get(&self, key: &$key) -> u64 {
                self.0.get(key).copied().unwrap_or(0)
            }

            pub fn total_seconds(&self) -> u64 {
                self.0.values().sum()
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn iter(&self) -> impl Iterator<Item = (&$key, &u64)> {
                self.0.iter()
            }

            pub fn into_inner(self) -> IndexMap<$key, u64> {
                self.0
            }

            fn add(&mut self, key: $key, seconds: u64) {
                let slot = self.0.entry(key).or_insert(0);
                *slot = slot.saturating_add(seconds);
            }
        }

        impl FromIterator<($key, u64)> for $name {
            fn from_iter<I: IntoIterator<Item = ($key, u64)>>(iter: I) -> Self {
                let mut totals = Self::default();
                for (key, seconds) in iter {
                    totals.add(key, seconds);
                }
                totals
            }
        }
    };
}

bucket_map!(DailyTotals, String);
bucket_map!(HourlyTotals, u32);

impl DailyTotals {
    /// Seven entries, one per day of the week starting at `week_start`,
    /// with zero for days that have no sessions.
    pub fn fill_week(&self, week_start: NaiveDate) -> Vec<(String, u64)> {
        (0..7)
            .filter_map(|offset| week_start.checked_add_days(Days::new(offset)))
            .map(|date| {
                let key = date.format("%Y-%m-%d").to_string();
                let seconds = self.get(&key);
                (key, seconds)
            })
            .collect()
    }
}

impl HourlyTotals {
    /// Twenty-four entries, hour 0 through 23.
    pub fn fill_hours(&self) -> Vec<(u32, u64)> {
        (0..24).map(|hour| (hour, self.get(&hour))).collect()
    }
}

/// Qualifying sessions in start-time order.
fn completed_work(sessions: &[Session]) -> Vec<&Session> {
    let mut counted: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.counts_towards_stats())
        .collect();
    counted.sort_by_key(|s| (s.start_time, s.id));
    counted
}

pub fn bucket_by_day(sessions: &[Session], calendar: &Calendar) -> DailyTotals {
    completed_work(sessions)
        .into_iter()
        .map(|s| (calendar.day_key(s.start_time), s.duration_seconds.unwrap_or(0)))
        .collect()
}

pub fn bucket_by_hour(sessions: &[Session], calendar: &Calendar) -> HourlyTotals {
    completed_work(sessions)
        .into_iter()
        .map(|s| (calendar.hour_of_day(s.start_time), s.duration_seconds.unwrap_or(0)))
        .collect()
}
