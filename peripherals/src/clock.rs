//! Wall clock anchored to an NTP sample, with Central European local time
//! (`CET-1CEST-2,M3.5.0/2,M10.5.0/3`).

use core::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};

const CET_OFFSET_SECS: i64 = 3600;
const CEST_OFFSET_SECS: i64 = 7200;

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Unix time derived from the monotonic uptime plus the offset learned at
/// the last sync. Before any sync the clock counts from the epoch, like an
/// unset RTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock {
    offset_ms: Option<i64>,
}

impl WallClock {
    pub const fn new() -> Self {
        Self { offset_ms: None }
    }

    pub fn sync(&mut self, unix_ms: u64, uptime_ms: u64) {
        self.offset_ms = Some(unix_ms as i64 - uptime_ms as i64);
    }

    pub fn is_synced(&self) -> bool {
        self.offset_ms.is_some()
    }

    pub fn unix_ms(&self, uptime_ms: u64) -> u64 {
        let offset = self.offset_ms.unwrap_or(0);
        (uptime_ms as i64 + offset).max(0) as u64
    }

    pub fn local_time(&self, uptime_ms: u64) -> Option<LocalTime> {
        LocalTime::from_unix((self.unix_ms(uptime_ms) / 1000) as i64)
    }
}

/// Last Sunday of `month`.
fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let last_day = NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()?;
    let back = last_day.weekday().num_days_from_sunday();
    last_day.checked_sub_signed(TimeDelta::days(i64::from(back)))
}

/// Summer time runs from 01:00 UTC on the last Sunday of March to 01:00 UTC
/// on the last Sunday of October.
pub fn is_summer_time(utc: &NaiveDateTime) -> bool {
    let year = utc.year();
    let bounds = last_sunday(year, 3)
        .and_then(|d| d.and_hms_opt(1, 0, 0))
        .zip(last_sunday(year, 10).and_then(|d| d.and_hms_opt(1, 0, 0)));
    match bounds {
        Some((start, end)) => *utc >= start && *utc < end,
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub datetime: NaiveDateTime,
    pub summer_time: bool,
}

impl LocalTime {
    pub fn from_unix(unix_secs: i64) -> Option<Self> {
        let utc = DateTime::from_timestamp(unix_secs, 0)?.naive_utc();
        let summer_time = is_summer_time(&utc);
        let offset = if summer_time {
            CEST_OFFSET_SECS
        } else {
            CET_OFFSET_SECS
        };
        let datetime = utc.checked_add_signed(TimeDelta::seconds(offset))?;
        Some(Self {
            datetime,
            summer_time,
        })
    }

    pub fn zone(&self) -> &'static str {
        if self.summer_time {
            "CEST"
        } else {
            "CET"
        }
    }

    fn weekday_name(&self) -> &'static str {
        WEEKDAYS[self.datetime.weekday().num_days_from_monday() as usize]
    }

    fn month_name(&self) -> &'static str {
        MONTHS[self.datetime.month0() as usize]
    }

    /// `Monday, January 01, 2024 13:05:09`
    pub fn long(&self) -> LongFormat<'_> {
        LongFormat(self)
    }

    /// C-locale `%c`: `Mon Jan  1 13:05:09 2024`
    pub fn ctime(&self) -> CtimeFormat<'_> {
        CtimeFormat(self)
    }
}

pub struct LongFormat<'a>(&'a LocalTime);

impl fmt::Display for LongFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.0;
        let dt = &t.datetime;
        write!(
            f,
            "{}, {} {:02}, {} {:02}:{:02}:{:02}",
            t.weekday_name(),
            t.month_name(),
            dt.day(),
            dt.year(),
            dt.hour(),
            dt.minute(),
            dt.second()
        )
    }
}

pub struct CtimeFormat<'a>(&'a LocalTime);

impl fmt::Display for CtimeFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.0;
        let dt = &t.datetime;
        write!(
            f,
            "{} {} {:>2} {:02}:{:02}:{:02} {}",
            &t.weekday_name()[..3],
            &t.month_name()[..3],
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            dt.year()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn last_sundays_of_2024() {
        assert_eq!(last_sunday(2024, 3), NaiveDate::from_ymd_opt(2024, 3, 31));
        assert_eq!(last_sunday(2024, 10), NaiveDate::from_ymd_opt(2024, 10, 27));
        assert_eq!(last_sunday(2025, 3), NaiveDate::from_ymd_opt(2025, 3, 30));
    }

    #[test]
    fn winter_is_utc_plus_one() {
        // 2024-01-15T12:00:00Z
        let t = LocalTime::from_unix(1_705_320_000).unwrap();
        assert!(!t.summer_time);
        assert_eq!(t.zone(), "CET");
        assert_eq!(t.datetime.hour(), 13);
    }

    #[test]
    fn summer_is_utc_plus_two() {
        // 2024-07-01T10:00:00Z
        let t = LocalTime::from_unix(1_719_828_000).unwrap();
        assert!(t.summer_time);
        assert_eq!(t.datetime.hour(), 12);
    }

    #[test]
    fn switches_at_one_utc() {
        // 2024-03-31T00:59:59Z and 01:00:00Z
        let before = LocalTime::from_unix(1_711_846_799).unwrap();
        let after = LocalTime::from_unix(1_711_846_800).unwrap();
        assert_eq!(before.long().to_string(), "Sunday, March 31, 2024 01:59:59");
        assert_eq!(after.long().to_string(), "Sunday, March 31, 2024 03:00:00");

        // 2024-10-27T00:59:59Z and 01:00:00Z
        let before = LocalTime::from_unix(1_729_990_799).unwrap();
        let after = LocalTime::from_unix(1_729_990_800).unwrap();
        assert_eq!(before.long().to_string(), "Sunday, October 27, 2024 02:59:59");
        assert_eq!(after.long().to_string(), "Sunday, October 27, 2024 02:00:00");
    }

    #[test]
    fn long_and_ctime_formats() {
        // 2024-01-01T12:05:09Z
        let t = LocalTime::from_unix(1_704_110_709).unwrap();
        assert_eq!(t.long().to_string(), "Monday, January 01, 2024 13:05:09");
        assert_eq!(t.ctime().to_string(), "Mon Jan  1 13:05:09 2024");
    }

    #[test]
    fn unsynced_clock_counts_from_epoch() {
        let clock = WallClock::new();
        assert!(!clock.is_synced());
        assert_eq!(clock.unix_ms(5_000), 5_000);
        let t = clock.local_time(0).unwrap();
        assert_eq!(t.ctime().to_string(), "Thu Jan  1 01:00:00 1970");
    }

    #[test]
    fn synced_clock_advances_with_uptime() {
        let mut clock = WallClock::new();
        clock.sync(1_704_067_200_000, 10_000);
        assert!(clock.is_synced());
        assert_eq!(clock.unix_ms(10_000), 1_704_067_200_000);
        assert_eq!(clock.unix_ms(15_500), 1_704_067_205_500);
    }
}
