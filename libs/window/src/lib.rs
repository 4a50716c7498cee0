//! Maintenance window primitives.
//!
//! This library provides the two small value types the reboot daemon
//! schedules against:
//!
//! - [`CalendarSpec`]: a recurring instant, e.g. `03:30` (every day) or
//!   `Mon,Fri 03:30:00` (only on those weekdays).
//! - Duration strings: `1h30m`, `02:15:00`, or a bare number of seconds,
//!   parsed by [`parse_duration`].
//!
//! Both types round-trip through their string form, which is what the
//! persisted configuration stores.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors from parsing calendar specs and duration strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    /// Calendar spec was empty.
    #[error("empty calendar spec")]
    EmptySpec,

    /// Hour field out of range.
    #[error("invalid hour {0} in calendar spec")]
    InvalidHour(u32),

    /// Minute field out of range.
    #[error("invalid minute {0} in calendar spec")]
    InvalidMinute(u32),

    /// Second field out of range.
    #[error("invalid second {0} in calendar spec")]
    InvalidSecond(u32),

    /// Weekday name not recognized.
    #[error("unknown weekday '{0}' in calendar spec")]
    UnknownWeekday(String),

    /// Time-of-day part is not HH:MM or HH:MM:SS.
    #[error("malformed time '{0}', expected HH:MM or HH:MM:SS")]
    MalformedTime(String),

    /// Duration string was empty.
    #[error("empty duration")]
    EmptyDuration,

    /// Duration string is not a recognized form.
    #[error("malformed duration '{0}', expected forms like 1h30m, 02:15:00 or seconds")]
    MalformedDuration(String),

    /// Durations must be positive.
    #[error("duration must be greater than zero")]
    ZeroDuration,
}

/// A recurring calendar instant: an optional weekday filter plus a time of
/// day. All arithmetic is done in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSpec {
    /// Weekdays the spec fires on. Empty means every day.
    days: Vec<Weekday>,
    time: NaiveTime,
}

impl CalendarSpec {
    /// The first matching instant strictly after `after`.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = after.date_naive();
        loop {
            let candidate = NaiveDateTime::new(date, self.time).and_utc();
            if candidate > after && self.matches_day(date.weekday()) {
                return candidate;
            }
            match date.succ_opt() {
                Some(next) => date = next,
                // Calendar overflow, several hundred millennia out.
                None => return candidate,
            }
        }
    }

    fn matches_day(&self, day: Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&day)
    }
}

impl FromStr for CalendarSpec {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let (day_part, time_part) = match parts.as_slice() {
            [] => return Err(WindowError::EmptySpec),
            [time] => (None, *time),
            [days, time] => (Some(*days), *time),
            _ => return Err(WindowError::MalformedTime(s.trim().to_string())),
        };

        let mut days = Vec::new();
        if let Some(day_part) = day_part {
            for name in day_part.split(',') {
                let day: Weekday = name
                    .parse()
                    .map_err(|_| WindowError::UnknownWeekday(name.to_string()))?;
                if !days.contains(&day) {
                    days.push(day);
                }
            }
        }

        let fields: Vec<&str> = time_part.split(':').collect();
        if fields.len() != 2 && fields.len() != 3 {
            return Err(WindowError::MalformedTime(time_part.to_string()));
        }
        let mut nums = [0u32; 3];
        for (i, field) in fields.iter().enumerate() {
            nums[i] = field
                .parse()
                .map_err(|_| WindowError::MalformedTime(time_part.to_string()))?;
        }
        let [hour, minute, second] = nums;
        if hour >= 24 {
            return Err(WindowError::InvalidHour(hour));
        }
        if minute >= 60 {
            return Err(WindowError::InvalidMinute(minute));
        }
        if second >= 60 {
            return Err(WindowError::InvalidSecond(second));
        }
        let time = NaiveTime::from_hms_opt(hour, minute, second)
            .ok_or(WindowError::MalformedTime(time_part.to_string()))?;

        Ok(Self { days, time })
    }
}

impl fmt::Display for CalendarSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, day) in self.days.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(day_name(*day))?;
        }
        if !self.days.is_empty() {
            f.write_str(" ")?;
        }
        use chrono::Timelike;
        if self.time.second() == 0 {
            write!(f, "{:02}:{:02}", self.time.hour(), self.time.minute())
        } else {
            write!(
                f,
                "{:02}:{:02}:{:02}",
                self.time.hour(),
                self.time.minute(),
                self.time.second()
            )
        }
    }
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

impl Serialize for CalendarSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CalendarSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A maintenance window: a recurring start instant and how long each
/// occurrence stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintWindow {
    pub start: CalendarSpec,
    pub duration: Duration,
}

impl MaintWindow {
    /// Whether `now` lies inside the window occurrence that most recently
    /// opened (including one that opened exactly at `now`).
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let span = chrono_span(self.duration);
        let prev = self.start.next_occurrence(now - span);
        prev <= now && now < prev + span
    }
}

fn chrono_span(duration: Duration) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
}

/// Parse a duration string.
///
/// Accepted forms: unit suffixes (`1h30m`, `45m`, `90s`), clock form
/// (`HH:MM` or `HH:MM:SS`), or a bare integer of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, WindowError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(WindowError::EmptyDuration);
    }

    let total = if s.contains(':') {
        parse_clock_duration(s)?
    } else if s.chars().all(|c| c.is_ascii_digit()) {
        s.parse()
            .map_err(|_| WindowError::MalformedDuration(s.to_string()))?
    } else {
        parse_unit_duration(s)?
    };

    if total == 0 {
        return Err(WindowError::ZeroDuration);
    }
    Ok(Duration::from_secs(total))
}

fn parse_clock_duration(s: &str) -> Result<u64, WindowError> {
    let fields: Vec<&str> = s.split(':').collect();
    if fields.len() != 2 && fields.len() != 3 {
        return Err(WindowError::MalformedDuration(s.to_string()));
    }
    let mut nums = [0u64; 3];
    for (i, field) in fields.iter().enumerate() {
        nums[i] = field
            .parse()
            .map_err(|_| WindowError::MalformedDuration(s.to_string()))?;
    }
    let [hours, minutes, seconds] = nums;
    if minutes >= 60 || seconds >= 60 {
        return Err(WindowError::MalformedDuration(s.to_string()));
    }
    Ok(hours * 3600 + minutes * 60 + seconds)
}

fn parse_unit_duration(s: &str) -> Result<u64, WindowError> {
    let mut total = 0u64;
    let mut value = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            value.push(c);
            continue;
        }
        let factor = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(WindowError::MalformedDuration(s.to_string())),
        };
        if value.is_empty() {
            return Err(WindowError::MalformedDuration(s.to_string()));
        }
        let n: u64 = value
            .parse()
            .map_err(|_| WindowError::MalformedDuration(s.to_string()))?;
        total += n * factor;
        value.clear();
    }
    // Trailing digits without a unit, e.g. "1h30".
    if !value.is_empty() {
        return Err(WindowError::MalformedDuration(s.to_string()));
    }
    Ok(total)
}

/// Render a duration in the `1h30m` form used by the config file.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}
