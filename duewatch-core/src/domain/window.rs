//! Fetch windows

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` interval of due instants queried in one fetch cycle
///
/// Windows are advanced with [`TimeWindow::next`], which makes the end of one
/// window the start of the following one, so consecutive cycles cover the
/// timeline without gaps or overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeWindow {
    /// Creates the window `[start, start + length)`
    pub fn starting_at(start: DateTime<FixedOffset>, length: Duration) -> Self {
        Self {
            start,
            end: start + length,
        }
    }

    /// Length of the window
    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    /// Returns the window immediately following this one, of the same length
    pub fn next(&self) -> Self {
        Self::starting_at(self.end, self.length())
    }

    /// Whether `instant` lies inside `[start, end)`
    pub fn contains(&self, instant: DateTime<FixedOffset>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Query parameters understood by the due-items endpoints
    pub fn query_params(&self) -> [(&'static str, String); 2] {
        [
            ("start_time", self.start.to_rfc3339()),
            ("end_time", self.end.to_rfc3339()),
        ]
    }
}
