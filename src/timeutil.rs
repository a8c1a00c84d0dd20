//! Guild-local date and time resolution on top of chrono + chrono-tz.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CampPollError, Result};

static VALIDATE_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}$").unwrap());

pub fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| CampPollError::InvalidTimezone(name.to_owned()))
}

/// Parse a wall-clock time in HH:MM form.
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    if !VALIDATE_TIME.is_match(s) {
        return Err(CampPollError::InvalidTime(s.to_owned()));
    }

    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| CampPollError::InvalidTime(s.to_owned()))?;
    let hour: u32 = h.parse().map_err(|_| CampPollError::InvalidTime(s.to_owned()))?;
    let minute: u32 = m.parse().map_err(|_| CampPollError::InvalidTime(s.to_owned()))?;

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| CampPollError::InvalidTime(s.to_owned()))
}

pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

pub fn tomorrow_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    today_in(tz, now) + Duration::days(1)
}

/// Resolve a guild-local wall-clock instant to UTC. Ambiguous times (DST
/// fall-back) take the earlier offset; skipped times (DST spring-forward)
/// resolve to `None` and the caller moves to the next day.
pub fn local_instant(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_accepts_hh_mm() {
        assert_eq!(parse_time("14:30").unwrap(), NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert_eq!(parse_time("9:05").unwrap(), NaiveTime::from_hms_opt(9, 5, 0).unwrap());
    }

    #[test]
    fn parse_time_rejects_garbage() {
        for bad in ["", "25:00", "12:60", "noon", "12:30:00", "12;30"] {
            assert!(parse_time(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn parse_tz_rejects_unknown_zone() {
        assert!(parse_tz("Europe/Helsinki").is_ok());
        assert!(parse_tz("Mars/Olympus").is_err());
    }

    #[test]
    fn helsinki_afternoon_maps_to_utc() {
        let tz = parse_tz("Europe/Helsinki").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let time = NaiveTime::from_hms_opt(14, 30, 0).unwrap();

        // Winter: UTC+2.
        let at = local_instant(date, time, tz).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 0).unwrap());
    }

    #[test]
    fn dst_skipped_time_resolves_to_none() {
        // Helsinki springs forward 2026-03-29 at 03:00 local; 03:30 never occurs.
        let tz = parse_tz("Europe/Helsinki").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 29).unwrap();
        let time = NaiveTime::from_hms_opt(3, 30, 0).unwrap();

        assert!(local_instant(date, time, tz).is_none());
    }

    #[test]
    fn tomorrow_rolls_over_the_local_midnight() {
        let tz = parse_tz("Europe/Helsinki").unwrap();
        // 23:30 UTC is already the next day in Helsinki.
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 23, 30, 0).unwrap();

        assert_eq!(today_in(tz, now), NaiveDate::from_ymd_opt(2026, 7, 2).unwrap());
        assert_eq!(tomorrow_in(tz, now), NaiveDate::from_ymd_opt(2026, 7, 3).unwrap());
    }
}
