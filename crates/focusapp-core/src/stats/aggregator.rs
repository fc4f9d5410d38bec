use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::buckets::{bucket_by_day, bucket_by_hour, DailyTotals, HourlyTotals};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::session::Session;
use crate::store::SessionStore;

/// Buckets plus the error that emptied them, for display code that should
/// not have to handle failures itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView<T> {
    pub buckets: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Default> StatsView<T> {
    fn from_result(result: Result<T, StoreError>, what: &str) -> Self {
        match result {
            Ok(buckets) => Self {
                buckets,
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "{what} stats unavailable");
                Self {
                    buckets: T::default(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Weekly and hourly duration totals over a [`SessionStore`].
pub struct StatsAggregator {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Per-day totals for the week containing `reference`.
    pub async fn weekly_stats(&self, reference: DateTime<Utc>) -> Result<DailyTotals, StoreError> {
        let calendar = self.clock.calendar();
        let (start, end) = calendar.week_range(reference);
        let sessions = self.fetch(start, end).await?;
        Ok(bucket_by_day(&sessions, calendar))
    }

    /// Per-hour totals for the day containing `reference`.
    pub async fn hourly_stats(&self, reference: DateTime<Utc>) -> Result<HourlyTotals, StoreError> {
        let calendar = self.clock.calendar();
        let (start, end) = calendar.day_range(reference);
        let sessions = self.fetch(start, end).await?;
        Ok(bucket_by_hour(&sessions, calendar))
    }

    pub async fn load_weekly_stats(&self, reference: DateTime<Utc>) -> StatsView<DailyTotals> {
        StatsView::from_result(self.weekly_stats(reference).await, "weekly")
    }

    pub async fn load_hourly_stats(&self, reference: DateTime<Utc>) -> StatsView<HourlyTotals> {
        StatsView::from_result(self.hourly_stats(reference).await, "hourly")
    }

    /// Local date the week containing `reference` begins on.
    pub fn week_start_date(&self, reference: DateTime<Utc>) -> NaiveDate {
        let calendar = self.clock.calendar();
        calendar.week_start_date(calendar.local_date(reference))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let mut sessions = self.store.query_range(start, end).await?;
        // Remote backends may round the bounds.
        sessions.retain(|s| s.start_time >= start && s.start_time < end);
        tracing::debug!(%start, %end, count = sessions.len(), "stats query");
        Ok(sessions)
    }
}
