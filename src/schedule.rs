use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::ApiError;

/// Current wall-clock time at the facility.
pub fn now(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

/// Parse a day name (e.g. "monday") into a chrono Weekday.
pub fn parse_weekday(day: &str) -> Option<Weekday> {
    match day.to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Parse a `H:MM am|pm` time-of-day into minutes past midnight.
///
/// 12-hour clock: "12:00 am" is midnight, "12:00 pm" is noon.
pub fn parse_time_of_day(s: &str) -> Result<u32, ApiError> {
    let mut parts = s.split_whitespace();
    let clock = parts.next().ok_or_else(|| bad_time(s))?;
    let meridiem = parts.next().ok_or_else(|| bad_time(s))?;
    if parts.next().is_some() {
        return Err(bad_time(s));
    }

    let (h, m) = clock.split_once(':').ok_or_else(|| bad_time(s))?;
    let hour: u32 = h.parse().map_err(|_| bad_time(s))?;
    let minute: u32 = m.parse().map_err(|_| bad_time(s))?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return Err(bad_time(s));
    }

    let hour = match meridiem.to_lowercase().as_str() {
        "am" => hour % 12,
        "pm" => {
            if hour >= 12 {
                hour
            } else {
                hour + 12
            }
        }
        _ => return Err(bad_time(s)),
    };
    Ok(hour * 60 + minute)
}

fn bad_time(s: &str) -> ApiError {
    ApiError::DataShape(format!("unparseable time of day: {s:?}"))
}

pub fn minutes_to_time(minutes: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap()
}

/// The next `n` calendar days, starting at (and including) `today`.
pub fn horizon_dates(today: NaiveDate, n: u32) -> Vec<NaiveDate> {
    (0..n as i64).map(|i| today + Duration::days(i)).collect()
}

/// Parse a remote date or RFC 3339 datetime string into a calendar date.
pub fn parse_remote_date(s: &str) -> Result<NaiveDate, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }
    s.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .ok_or_else(|| ApiError::DataShape(format!("unparseable date: {s:?}")))
}

/// Start of the next operating day: local midnight plus the rollover offset.
pub fn next_day_start(now: DateTime<Tz>, offset_min: i64) -> DateTime<Tz> {
    let tz = now.timezone();
    let midnight = (now.date_naive() + Duration::days(1)).and_time(NaiveTime::MIN);
    midnight.and_local_timezone(tz).earliest().unwrap() + Duration::minutes(offset_min)
}

/// Re-poll cadence for the horizon wait, kept as a pure computation so the
/// control loop's waiting is checkable without sleeping.
#[derive(Debug, Clone, Copy)]
pub enum PollCadence {
    /// Fixed interval between checks.
    Every(Duration),
    /// Wake at the top of the next hour.
    NextHour,
}

impl PollCadence {
    /// How long to sleep before the next check, given the current instant.
    pub fn delay_from(&self, now: NaiveDateTime) -> Duration {
        match self {
            PollCadence::Every(d) => *d,
            PollCadence::NextHour => {
                let next = (now + Duration::hours(1))
                    .with_minute(0)
                    .unwrap()
                    .with_second(0)
                    .unwrap()
                    .with_nanosecond(0)
                    .unwrap();
                next - now
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_weekday() {
        assert_eq!(parse_weekday("monday"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("FRIDAY"), Some(Weekday::Fri));
        assert_eq!(parse_weekday("invalid"), None);
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("12:00 am").unwrap(), 0);
        assert_eq!(parse_time_of_day("12:00 pm").unwrap(), 720);
        assert_eq!(parse_time_of_day("1:30 pm").unwrap(), 810);
        assert_eq!(parse_time_of_day("11:45 am").unwrap(), 705);
        assert_eq!(parse_time_of_day("9:00 AM").unwrap(), 540);
    }

    #[test]
    fn test_parse_time_of_day_is_stable() {
        for _ in 0..3 {
            assert_eq!(parse_time_of_day("1:30 pm").unwrap(), 810);
        }
    }

    #[test]
    fn test_parse_time_of_day_rejects_garbage() {
        assert!(parse_time_of_day("25:00 pm").is_err());
        assert!(parse_time_of_day("9:75 am").is_err());
        assert!(parse_time_of_day("9:00").is_err());
        assert!(parse_time_of_day("9:00 xm").is_err());
        assert!(parse_time_of_day("").is_err());
    }

    #[test]
    fn test_horizon_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let days = horizon_dates(today, 8);
        assert_eq!(days.len(), 8);
        assert_eq!(days[0], today);
        assert_eq!(days[7], NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
    }

    #[test]
    fn test_parse_remote_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            parse_remote_date("2024-01-05T00:00:00.000Z").unwrap(),
            expected
        );
        assert_eq!(parse_remote_date("2024-01-05").unwrap(), expected);
        assert!(parse_remote_date("05/01/2024").is_err());
    }

    #[test]
    fn test_next_hour_cadence() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 20, 0)
            .unwrap();
        assert_eq!(PollCadence::NextHour.delay_from(at).num_seconds(), 2400);

        let on_the_hour = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(
            PollCadence::NextHour.delay_from(on_the_hour).num_seconds(),
            3600
        );
    }

    #[test]
    fn test_fixed_cadence() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(23, 40, 0)
            .unwrap();
        let cadence = PollCadence::Every(Duration::minutes(20));
        assert_eq!(cadence.delay_from(at).num_seconds(), 1200);
    }

    #[test]
    fn test_next_day_start_applies_offset() {
        let tz: Tz = "Europe/London".parse().unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
            .and_local_timezone(tz)
            .unwrap();
        let next = next_day_start(now, 55);
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(next.time(), NaiveTime::from_hms_opt(0, 55, 0).unwrap());
    }
}
