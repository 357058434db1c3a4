//! J2kSec time handling.
//!
//! All catalog and constraint times are seconds since 2000-01-01T12:00:00Z.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Result, WinstonError};

/// Unix timestamp of the J2kSec epoch.
pub const J2K_EPOCH_UNIX: f64 = 946_728_000.0;

/// Inclusive `[start, end]` window in J2kSec.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeSpan {
    pub start: f64,
    pub end: f64,
}

impl TimeSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// True when `[start, end]` intersects this span.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        start <= self.end && end >= self.start
    }
}

pub fn j2k_to_unix(j2k: f64) -> f64 {
    j2k + J2K_EPOCH_UNIX
}

pub fn unix_to_j2k(unix: f64) -> f64 {
    unix - J2K_EPOCH_UNIX
}

pub fn datetime_to_j2k(dt: &DateTime<Utc>) -> f64 {
    let unix = dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_micros()) / 1e6;
    unix_to_j2k(unix)
}

pub fn j2k_to_datetime(j2k: f64) -> Option<DateTime<Utc>> {
    let unix = j2k_to_unix(j2k);
    let secs = unix.floor();
    let nanos = ((unix - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Current wall-clock time in J2kSec.
pub fn now_j2k() -> f64 {
    datetime_to_j2k(&Utc::now())
}

/// Parse an FDSN timestamp: `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.ffffff][Z]`.
pub fn parse_fdsn_time(s: &str) -> Result<f64> {
    let trimmed = s.trim().trim_end_matches('Z');
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(datetime_to_j2k(&dt.and_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(datetime_to_j2k(&dt.and_utc()));
        }
    }
    Err(WinstonError::InvalidTime(s.to_owned()))
}

/// Format J2kSec as an FDSN timestamp with microseconds.
pub fn format_fdsn_time(j2k: f64) -> String {
    match j2k_to_datetime(j2k) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        None => String::new(),
    }
}
