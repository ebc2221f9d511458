use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for a session that has not been rated yet.
pub const QUALITY_UNRATED: i32 = -1;
/// Valid ratings are the closed set QUALITY_MIN..=QUALITY_MAX.
pub const QUALITY_MIN: i32 = 0;
pub const QUALITY_MAX: i32 = 5;

/// Id of a record that has not been persisted yet; storage assigns the
/// real key on insert.
pub const UNSAVED_ID: i64 = 0;

/// One tracked sleep interval. `end_time == start_time` means the session
/// is still active; `end_time > start_time` means it completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepSession {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub quality: i32,
}

impl SleepSession {
    /// A fresh, unrated session starting now. Timestamps are normalized to
    /// whole milliseconds so a storage round trip is exact.
    pub fn begin() -> Self {
        Self::begin_at(Utc::now())
    }

    pub fn begin_at(start: DateTime<Utc>) -> Self {
        let start = truncate_to_millis(start);
        Self {
            id: UNSAVED_ID,
            start_time: start,
            end_time: start,
            quality: QUALITY_UNRATED,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time == self.start_time
    }

    pub fn is_rated(&self) -> bool {
        self.quality != QUALITY_UNRATED
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// Current time at millisecond precision, matching what storage persists.
pub fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

pub fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(t.timestamp_millis())
        .single()
        .unwrap_or(t)
}
