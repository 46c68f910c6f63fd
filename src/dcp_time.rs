//! Time within a composition (`Time`) and wall-clock timestamps with a timezone (`LocalTime`).

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};

use crate::types::Standard;
use crate::{Error, Result};

/// A position or duration within timed content: hours, minutes, seconds and `e` ticks, where
/// there are `tcr` ticks to the second.
///
/// Interop subtitle files use a tick rate of 250 by convention; SMPTE subtitle files declare
/// their own `TimeCodeRate` (typically the edit rate, sometimes 1000).
#[derive(Debug, Clone, Copy)]
pub struct Time {
    pub h: i64,
    pub m: i64,
    pub s: i64,
    pub e: i64,
    pub tcr: i64,
}

impl Default for Time {
    fn default() -> Time {
        Time { h: 0, m: 0, s: 0, e: 0, tcr: 1 }
    }
}

impl Time {
    pub fn new(h: i64, m: i64, s: i64, e: i64, tcr: i64) -> Time {
        Time { h, m, s, e, tcr }
    }

    /// Parse `HH:MM:SS:EE`; the last field counts ticks at `tcr` if given, otherwise the
    /// Interop convention of 250 ticks per second applies.
    pub fn from_string(s: &str, tcr: Option<i64>) -> Result<Time> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(Error::XMLError(format!("unrecognised time {s}")));
        }
        let mut fields = [0i64; 4];
        for (i, p) in parts.iter().enumerate() {
            fields[i] = p
                .parse()
                .map_err(|_| Error::XMLError(format!("unrecognised time {s}")))?;
        }
        Ok(Time {
            h: fields[0],
            m: fields[1],
            s: fields[2],
            e: fields[3],
            tcr: tcr.unwrap_or(250),
        })
    }

    /// Build from a whole number of editable units at `rate` units per second.
    pub fn from_editable_units(units: i64, rate: i64) -> Time {
        let total_s = units / rate;
        Time {
            h: total_s / 3600,
            m: (total_s / 60) % 60,
            s: total_s % 60,
            e: units % rate,
            tcr: rate,
        }
    }

    fn total_ticks(&self) -> i64 {
        ((self.h * 60 + self.m) * 60 + self.s) * self.tcr + self.e
    }

    fn from_ticks(ticks: i64, tcr: i64) -> Time {
        // Negative results are clamped: times before zero have no meaning in a reel.
        let ticks = ticks.max(0);
        let total_s = ticks / tcr;
        Time {
            h: total_s / 3600,
            m: (total_s / 60) % 60,
            s: total_s % 60,
            e: ticks % tcr,
            tcr,
        }
    }

    pub fn as_seconds(&self) -> f64 {
        (self.h * 3600 + self.m * 60 + self.s) as f64 + self.e as f64 / self.tcr as f64
    }

    /// This time expressed in editable units at `rate` per second, rounding down.
    pub fn as_editable_units_floor(&self, rate: i64) -> i64 {
        let t = self.total_ticks();
        (t * rate).div_euclid(self.tcr)
    }

    /// This time expressed in editable units at `rate` per second, rounding up.
    pub fn as_editable_units_ceil(&self, rate: i64) -> i64 {
        let t = self.total_ticks();
        (t * rate + self.tcr - 1).div_euclid(self.tcr)
    }

    /// Rescale to a different tick rate, rounding to nearest.
    pub fn rebase(&self, tcr: i64) -> Time {
        let t = self.total_ticks();
        Time::from_ticks((t * tcr + self.tcr / 2) / self.tcr, tcr)
    }

    /// The SMPTE string form `HH:MM:SS:EE`.
    pub fn as_string(&self, standard: Standard) -> String {
        match standard {
            Standard::Smpte => {
                let width = if self.tcr > 100 { 3 } else { 2 };
                format!("{:02}:{:02}:{:02}:{:0width$}", self.h, self.m, self.s, self.e)
            }
            Standard::Interop => {
                format!("{:02}:{:02}:{:02}:{:03}", self.h, self.m, self.s, self.e)
            }
        }
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Time) -> bool {
        self.total_ticks() * other.tcr == other.total_ticks() * self.tcr
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Time) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Time) -> Ordering {
        (self.total_ticks() * other.tcr).cmp(&(other.total_ticks() * self.tcr))
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, other: Time) -> Time {
        let other = if other.tcr == self.tcr { other } else { other.rebase(self.tcr) };
        Time::from_ticks(self.total_ticks() + other.total_ticks(), self.tcr)
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, other: Time) -> Time {
        let other = if other.tcr == self.tcr { other } else { other.rebase(self.tcr) };
        Time::from_ticks(self.total_ticks() - other.total_ticks(), self.tcr)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}:{}", self.h, self.m, self.s, self.e)
    }
}

/// A local date/time with a timezone offset, as used in `<IssueDate>`, KDM validity windows
/// and certificate lifetimes. Serializes as ISO 8601 with the offset appended, e.g.
/// `2020-08-28T13:35:06+02:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    inner: DateTime<FixedOffset>,
}

impl LocalTime {
    /// The current time in the local timezone.
    pub fn now() -> LocalTime {
        let now = Local::now();
        LocalTime { inner: now.with_timezone(now.offset()) }
    }

    pub fn from_datetime(inner: DateTime<FixedOffset>) -> LocalTime {
        LocalTime { inner }
    }

    /// Parse an ISO 8601 date/time. A missing offset is taken as UTC.
    pub fn from_string(s: &str) -> Result<LocalTime> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(LocalTime { inner: dt });
        }
        for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.3f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                let offset = FixedOffset::east_opt(0).unwrap();
                return Ok(LocalTime {
                    inner: offset.from_local_datetime(&naive).single().ok_or_else(|| {
                        Error::MiscError(format!("ambiguous local time {s}"))
                    })?,
                });
            }
        }
        Err(Error::MiscError(format!("unrecognised date/time {s}")))
    }

    pub fn as_string(&self) -> String {
        self.inner.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
    }

    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        self.inner.year()
    }

    /// The instant in UTC, for ordering.
    pub fn as_utc(&self) -> DateTime<Utc> {
        self.inner.with_timezone(&Utc)
    }
}

impl PartialOrd for LocalTime {
    fn partial_cmp(&self, other: &LocalTime) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalTime {
    fn cmp(&self, other: &LocalTime) -> Ordering {
        self.as_utc().cmp(&other.as_utc())
    }
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_parsing() {
        let t = Time::from_string("01:02:03:04", Some(24)).unwrap();
        assert_eq!((t.h, t.m, t.s, t.e, t.tcr), (1, 2, 3, 4, 24));
        let t = Time::from_string("00:00:04:125", None).unwrap();
        assert_eq!(t.tcr, 250);
        assert!(Time::from_string("00:00:04", Some(24)).is_err());
        assert!(Time::from_string("00:00:xx:00", Some(24)).is_err());
    }

    #[test]
    fn time_equality_is_rational() {
        assert_eq!(Time::new(0, 0, 1, 0, 24), Time::new(0, 0, 1, 0, 250));
        assert_eq!(Time::new(0, 0, 0, 12, 24), Time::new(0, 0, 0, 125, 250));
        assert_ne!(Time::new(0, 0, 0, 1, 24), Time::new(0, 0, 0, 1, 250));
        assert_eq!(Time::default(), Time::new(0, 0, 0, 0, 1000));
    }

    #[test]
    fn time_arithmetic() {
        let a = Time::new(0, 0, 4, 0, 24);
        let b = Time::new(0, 0, 1, 12, 24);
        assert_eq!(a + b, Time::new(0, 0, 5, 12, 24));
        assert_eq!(a - b, Time::new(0, 0, 2, 12, 24));
        // subtraction clamps at zero
        assert_eq!(b - a, Time::new(0, 0, 0, 0, 24));
    }

    #[test]
    fn editable_units() {
        let t = Time::new(0, 0, 4, 0, 250);
        assert_eq!(t.as_editable_units_floor(24), 96);
        assert_eq!(t.as_editable_units_ceil(24), 96);
        let t = Time::new(0, 0, 0, 100, 250);
        // 100/250 s at 24 fps = 9.6 frames
        assert_eq!(t.as_editable_units_floor(24), 9);
        assert_eq!(t.as_editable_units_ceil(24), 10);
    }

    #[test]
    fn from_editable_units() {
        let t = Time::from_editable_units(25, 24);
        assert_eq!((t.h, t.m, t.s, t.e, t.tcr), (0, 0, 1, 1, 24));
    }

    #[test]
    fn smpte_and_interop_strings() {
        let t = Time::new(1, 2, 3, 4, 24);
        assert_eq!(t.as_string(Standard::Smpte), "01:02:03:04");
        let t = Time::new(0, 0, 0, 125, 250);
        assert_eq!(t.as_string(Standard::Interop), "00:00:00:125");
        let t = Time::new(0, 0, 0, 999, 1000);
        assert_eq!(t.as_string(Standard::Smpte), "00:00:00:999");
    }

    #[test]
    fn local_time_round_trip() {
        let t = LocalTime::from_string("2020-08-28T13:35:06+02:00").unwrap();
        assert_eq!(t.as_string(), "2020-08-28T13:35:06+02:00");
        let u = LocalTime::from_string("2020-08-28T11:35:06+00:00").unwrap();
        assert_eq!(t, u);
        let without_offset = LocalTime::from_string("2015-01-01T00:00:00").unwrap();
        assert_eq!(without_offset.as_string(), "2015-01-01T00:00:00+00:00");
    }

    #[test]
    fn local_time_ordering_uses_utc() {
        let a = LocalTime::from_string("2020-08-28T13:35:06+02:00").unwrap();
        let b = LocalTime::from_string("2020-08-28T13:35:06+00:00").unwrap();
        assert!(a < b);
    }
}
