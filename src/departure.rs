//! Departure time specifications and their expansion into absolute instants.

use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::error::ConfigError;

/// Format used for `departure_time` cells in the output dataset.
pub const DEPARTURE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// Which local wall-clock times to query on the chosen date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartureTimes {
    /// An explicit list such as `08:00, 17:30`.
    List(Vec<NaiveTime>),
    /// Every `interval` from `start`, up to and including `end` when it lands
    /// exactly on a step.
    Window {
        start: NaiveTime,
        end: NaiveTime,
        interval: Duration,
    },
}

impl DepartureTimes {
    /// Parses a comma separated list of `HH:MM` times.
    pub fn parse_list(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Err(ConfigError::InvalidDeparture(
                "at least one departure time must be provided".to_string(),
            ));
        }
        let times = text
            .split(',')
            .map(|t| parse_time(t.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::List(times))
    }

    pub fn window(start: &str, end: &str, interval_minutes: u32) -> Result<Self, ConfigError> {
        let start = parse_time(start.trim())?;
        let end = parse_time(end.trim())?;
        if end < start {
            return Err(ConfigError::InvalidDeparture(format!(
                "end time {end} is before start time {start}"
            )));
        }
        if interval_minutes == 0 {
            return Err(ConfigError::InvalidDeparture(
                "interval must be at least one minute".to_string(),
            ));
        }
        Ok(Self::Window {
            start,
            end,
            interval: Duration::minutes(i64::from(interval_minutes)),
        })
    }

    /// Local times in query order.
    pub fn local_times(&self) -> Vec<NaiveTime> {
        match self {
            Self::List(times) => times.clone(),
            Self::Window {
                start,
                end,
                interval,
            } => {
                let mut times = Vec::new();
                let mut offset = Duration::zero();
                while offset <= *end - *start {
                    times.push(*start + offset);
                    offset += *interval;
                }
                times
            }
        }
    }
}

/// A date, a named time zone, and the local times to query on that date.
#[derive(Debug, Clone)]
pub struct DepartureSpec {
    pub date: NaiveDate,
    pub time_zone: Tz,
    pub times: DepartureTimes,
}

impl DepartureSpec {
    pub fn new(date: &str, time_zone: &str, times: DepartureTimes) -> Result<Self, ConfigError> {
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| {
            ConfigError::InvalidDeparture(format!("date {date:?} is not YYYY-MM-DD: {e}"))
        })?;
        let time_zone: Tz = time_zone
            .trim()
            .parse()
            .map_err(|_| ConfigError::UnknownTimeZone(time_zone.to_string()))?;
        Ok(Self {
            date,
            time_zone,
            times,
        })
    }

    /// Resolves every local time to an instant that keeps its UTC offset.
    ///
    /// A local time repeated by a DST fall-back resolves to its earlier
    /// occurrence; one skipped by a spring-forward is an error.
    pub fn instants(&self) -> Result<Vec<DateTime<FixedOffset>>, ConfigError> {
        self.times
            .local_times()
            .into_iter()
            .map(|time| {
                let local = self.date.and_time(time);
                match self.time_zone.from_local_datetime(&local) {
                    LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                        Ok(dt.fixed_offset())
                    }
                    LocalResult::None => Err(ConfigError::InvalidDeparture(format!(
                        "{local} does not exist in {}",
                        self.time_zone
                    ))),
                }
            })
            .collect()
    }
}

fn parse_time(text: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .map_err(|e| ConfigError::InvalidDeparture(format!("{text:?} is not HH:MM: {e}")))
}
