//! Time source and calendar bucketing.
//!
//! All instants inside the crate are UTC. Bucket boundaries (start of day,
//! start of week) are computed in the configured [`Zone`] and converted back
//! to UTC, so a "day" is always a local calendar day even across DST shifts.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone,
    Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

/// Time zone used to derive local calendar boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Zone {
    /// The operating system's local time zone.
    Local,
    /// A fixed offset from UTC.
    Fixed(FixedOffset),
}

impl Default for Zone {
    fn default() -> Self {
        Zone::Local
    }
}

impl Zone {
    /// Parse `"local"`, `"utc"`, `"Z"` or a `±HH:MM` offset.
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(Zone::Local);
        }
        if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return FixedOffset::east_opt(0)
                .map(Zone::Fixed)
                .ok_or_else(|| "invalid offset".to_string());
        }

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(format!("invalid time zone '{value}': expected 'local' or ±HH:MM")),
        };
        let (hours, minutes) = rest
            .split_once(':')
            .ok_or_else(|| format!("invalid time zone '{value}': expected ±HH:MM"))?;
        let hours: i32 = hours
            .parse()
            .map_err(|_| format!("invalid hours in time zone '{value}'"))?;
        let minutes: i32 = minutes
            .parse()
            .map_err(|_| format!("invalid minutes in time zone '{value}'"))?;
        if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
            return Err(format!("time zone '{value}' out of range"));
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Zone::Fixed)
            .ok_or_else(|| format!("time zone '{value}' out of range"))
    }

    /// Fixed offset of `hours` east of UTC, or `None` outside ±23h.
    pub fn fixed_hours(hours: i32) -> Option<Self> {
        hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .map(Zone::Fixed)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Local => write!(f, "local"),
            Zone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

impl TryFrom<String> for Zone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Zone::parse(&value)
    }
}

impl From<Zone> for String {
    fn from(zone: Zone) -> Self {
        zone.to_string()
    }
}

/// Calendar conventions: time zone plus first day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub zone: Zone,
    pub week_start: Weekday,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            zone: Zone::Local,
            week_start: Weekday::Mon,
        }
    }
}

impl Calendar {
    pub fn new(zone: Zone, week_start: Weekday) -> Self {
        Self { zone, week_start }
    }

    pub fn local_naive(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self.zone {
            Zone::Local => instant.with_timezone(&Local).naive_local(),
            Zone::Fixed(offset) => instant.with_timezone(&offset).naive_local(),
        }
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local_naive(instant).date()
    }

    /// First valid instant of the local calendar day `date`.
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(chrono::NaiveTime::MIN);
        match self.zone {
            Zone::Local => resolve_local(&Local, naive),
            Zone::Fixed(offset) => resolve_local(&offset, naive),
        }
    }

    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(self.local_date(instant))
    }

    /// Local date on which the week containing `date` begins.
    pub fn week_start_date(&self, date: NaiveDate) -> NaiveDate {
        let back = (date.weekday().num_days_from_monday() + 7
            - self.week_start.num_days_from_monday())
            % 7;
        date.checked_sub_days(Days::new(u64::from(back)))
            .unwrap_or(date)
    }

    pub fn start_of_week(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(self.week_start_date(self.local_date(instant)))
    }

    /// Midnight `days` local calendar days after the day containing `instant`.
    pub fn days_after(&self, instant: DateTime<Utc>, days: u64) -> DateTime<Utc> {
        let date = self.local_date(instant);
        let target = date.checked_add_days(Days::new(days)).unwrap_or(date);
        self.midnight(target)
    }

    /// `[start_of_day, next local midnight)`.
    pub fn day_range(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start_of_day(instant);
        (start, self.days_after(start, 1))
    }

    /// `[start_of_week, start_of_week + 7 days)`.
    pub fn week_range(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.start_of_week(instant);
        (start, self.days_after(start, 7))
    }

    /// `YYYY-MM-DD` of the local day containing `instant`.
    pub fn day_key(&self, instant: DateTime<Utc>) -> String {
        self.local_date(instant).format("%Y-%m-%d").to_string()
    }

    /// Local hour (0..=23) of `instant`.
    pub fn hour_of_day(&self, instant: DateTime<Utc>) -> u32 {
        self.local_naive(instant).hour()
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Inside a DST gap; the first valid wall time is at most an hour later.
    tz.from_local_datetime(&(naive + Duration::hours(1)))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Source of "now" plus calendar conventions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn calendar(&self) -> &Calendar;

    fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.calendar().start_of_day(instant)
    }

    fn start_of_week(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.calendar().start_of_week(instant)
    }
}

/// Wall clock.
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    calendar: Calendar,
}

impl SystemClock {
    pub fn new(calendar: Calendar) -> Self {
        Self { calendar }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn calendar(&self) -> &Calendar {
        &self.calendar
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    calendar: Calendar,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>, calendar: Calendar) -> Self {
        Self {
            now: Mutex::new(now),
            calendar,
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn calendar(&self) -> &Calendar {
        &self.calendar
    }
}
