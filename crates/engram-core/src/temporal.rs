//! Temporal types for the memory engine
//!
//! Facts and episodes carry two timestamps: when the underlying
//! conversation happened (event time) and when the record entered the
//! store (ingest time). Scoring and retention always reason over event
//! time; ingest time exists for auditing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event time - when something was actually said or observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventTime(DateTime<Utc>);

impl EventTime {
    /// Create a new event time from the current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create from a DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create from milliseconds since Unix epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now))
    }

    /// Get as DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Get as milliseconds since Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Age of this timestamp relative to `now`, in whole seconds.
    /// Negative if the timestamp lies in the future.
    pub fn age_secs(&self, now: EventTime) -> i64 {
        (now.as_millis() - self.as_millis()) / 1000
    }

    /// Age of this timestamp relative to `now`, in fractional days.
    pub fn age_days(&self, now: EventTime) -> f64 {
        (now.as_millis() - self.as_millis()) as f64 / (24.0 * 60.0 * 60.0 * 1000.0)
    }
}

impl Default for EventTime {
    fn default() -> Self {
        Self::now()
    }
}

/// Ingest time - when a record was written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IngestTime(DateTime<Utc>);

impl IngestTime {
    /// Create a new ingest time from the current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create from a DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create from milliseconds since Unix epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now))
    }

    /// Get as DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Get as milliseconds since Unix epoch
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Default for IngestTime {
    fn default() -> Self {
        Self::now()
    }
}

/// Half-open time range used when slicing message streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeRange {
    /// Create a new range
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    /// Create a range from now going back a number of days
    pub fn last_days(days: i64) -> Self {
        let end = EventTime::now();
        let start = EventTime::from_millis(end.as_millis() - days * 24 * 60 * 60 * 1000);
        Self { start, end }
    }

    /// Check if a time is within this range (inclusive)
    pub fn contains(&self, time: EventTime) -> bool {
        time >= self.start && time <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_time_from_millis() {
        let millis = 1700000000000i64;
        let time = EventTime::from_millis(millis);
        assert_eq!(time.as_millis(), millis);
    }

    #[test]
    fn test_event_time_ordering() {
        let t1 = EventTime::from_millis(1000);
        let t2 = EventTime::from_millis(2000);
        assert!(t2 > t1);
    }

    #[test]
    fn test_age_secs() {
        let past = EventTime::from_millis(0);
        let now = EventTime::from_millis(90_000);
        assert_eq!(past.age_secs(now), 90);
    }

    #[test]
    fn test_age_days() {
        let past = EventTime::from_millis(0);
        let now = EventTime::from_millis(36 * 60 * 60 * 1000);
        assert!((past.age_days(now) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_time_range_contains() {
        let range = TimeRange::new(EventTime::from_millis(100), EventTime::from_millis(200));
        assert!(range.contains(EventTime::from_millis(150)));
        assert!(range.contains(EventTime::from_millis(100)));
        assert!(range.contains(EventTime::from_millis(200)));
        assert!(!range.contains(EventTime::from_millis(201)));
    }

    #[test]
    fn test_last_days_range() {
        let range = TimeRange::last_days(7);
        let yesterday = EventTime::from_millis(range.end.as_millis() - 24 * 60 * 60 * 1000);
        let two_weeks_ago =
            EventTime::from_millis(range.end.as_millis() - 14 * 24 * 60 * 60 * 1000);
        assert!(range.contains(yesterday));
        assert!(!range.contains(two_weeks_ago));
    }
}
