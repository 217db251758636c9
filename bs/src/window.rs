//! Daily sending-window gate
//!
//! A fixed target-zone offset and a fixed daily interval decide when
//! dispatch is allowed. Callers sleep for the reported wait and recheck, so
//! clock drift and suspend/resume during the wait are tolerated.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MINUTES_PER_DAY: i64 = 24 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SendWindow {
    /// First allowed minute-of-day, inclusive (480 = 08:00)
    #[serde(default = "default_start_minute")]
    pub start_minute: u32,

    /// End of the window, exclusive (1200 = 20:00)
    #[serde(default = "default_end_minute")]
    pub end_minute: u32,

    /// Fixed offset of the target zone from UTC, minutes (-240 = UTC-4)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

fn default_start_minute() -> u32 {
    8 * 60
}

fn default_end_minute() -> u32 {
    20 * 60
}

fn default_utc_offset() -> i32 {
    -4 * 60
}

impl Default for SendWindow {
    fn default() -> Self {
        Self {
            start_minute: default_start_minute(),
            end_minute: default_end_minute(),
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

impl SendWindow {
    /// Minute-of-day in the target zone, normalized to [0, 1440)
    fn local_minute(&self, now: DateTime<Utc>) -> i64 {
        let epoch_minutes = now.timestamp().div_euclid(60);
        (epoch_minutes + i64::from(self.utc_offset_minutes)).rem_euclid(MINUTES_PER_DAY)
    }

    /// Whether `now` falls inside the allowed interval `[start, end)`
    pub fn is_within(&self, now: DateTime<Utc>) -> bool {
        let minute = self.local_minute(now);
        i64::from(self.start_minute) <= minute && minute < i64::from(self.end_minute)
    }

    /// Zero inside the window, otherwise the time until the next window
    /// start, rolling past midnight when the day's window is already over
    pub fn wait_until_open(&self, now: DateTime<Utc>) -> Duration {
        if self.is_within(now) {
            return Duration::ZERO;
        }

        let minute = self.local_minute(now);
        let start = i64::from(self.start_minute);
        let wait_minutes = if minute < start {
            start - minute
        } else {
            MINUTES_PER_DAY - minute + start
        };
        Duration::from_secs((wait_minutes * 60) as u64)
    }
}
