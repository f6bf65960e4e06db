//! Clock value sent to the device
//!
//! The firmware expects local wall-clock time encoded as if it were an epoch
//! timestamp, so the local UTC offset is added to the real epoch seconds.

use chrono::{DateTime, Local, Offset, TimeZone};

/// Returns `override_ts` unchanged when set and non-zero, otherwise the current
/// local wall-clock time as epoch seconds.
pub fn compute_timestamp(override_ts: Option<i64>) -> i64 {
    match override_ts {
        Some(ts) if ts != 0 => ts,
        _ => local_wall_clock_seconds(&Local::now()),
    }
}

pub fn local_wall_clock_seconds<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    now.timestamp() + i64::from(now.offset().fix().local_minus_utc())
}
