use chrono::{DateTime, Local, TimeZone};

use std::fmt::Write;

macro_rules! plur {
    ($num:expr, $single:expr, $plur:expr) => {{
        if $num > 1 {
            $plur
        } else {
            $single
        }
    }};
}

macro_rules! plur_day {
    ($num:expr) => {{
        plur!($num, "day", "days")
    }};
}

#[macro_export]
macro_rules! swrite {

    ($out:expr, $($y:expr),+) => {
        if let Err(e) = write!($out, $($y), +) {
            log::warn!("swrite error {:?}", e);
            //fall back
            let s = format!($($y), +);
            $out.push_str(&s);
    }}
}

pub const USEC_PER_SEC: u64 = 1_000_000;
pub const USEC_PER_MSEC: u64 = 1000;
pub const SEC_PER_MINUTE: u64 = 60;
const SEC_PER_HOUR: u64 = 60 * SEC_PER_MINUTE;
const SEC_PER_DAY: u64 = 24 * SEC_PER_HOUR;
const USEC_PER_MINUTE: u64 = SEC_PER_MINUTE * USEC_PER_SEC;
const USEC_PER_DAY: u64 = SEC_PER_DAY * USEC_PER_SEC;
/// 365 days, past this a "duration" is most likely a point in time
pub const USEC_PER_365_DAYS: u64 = 365 * USEC_PER_DAY;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn get_date_local(timestamp_sec: u64, nanos: u32) -> Option<DateTime<Local>> {
    let secs = i64::try_from(timestamp_sec).ok()?;
    Local.timestamp_opt(secs, nanos).earliest()
}

/// Local date of a microsecond timestamp, truncated to the second.
pub fn format_local_date_sec(timestamp_usec: u64) -> Option<String> {
    let date = get_date_local(timestamp_usec / USEC_PER_SEC, 0)?;
    Some(date.format(DATE_FORMAT).to_string())
}

/// Local date of a microsecond timestamp, the fraction is only written when not zero.
pub fn format_local_date_usec(timestamp_usec: u64) -> Option<String> {
    let micros = timestamp_usec % USEC_PER_SEC;
    let date = get_date_local(timestamp_usec / USEC_PER_SEC, (micros * 1000) as u32)?;

    let mut out = date.format(DATE_FORMAT).to_string();
    if micros != 0 {
        swrite!(out, ".{micros:06}");
    }
    Some(out)
}

/// Formats short durations with one unit, keeps one decimal only if needed.
///
/// Returns `None` from one minute, use [`format_day_clock`] past that.
pub fn format_short_duration(duration_usec: u64) -> Option<String> {
    let (magnitude, suffix) = if duration_usec < USEC_PER_MSEC {
        return Some(format!("{duration_usec}us"));
    } else if duration_usec < USEC_PER_SEC {
        (USEC_PER_MSEC, "ms")
    } else if duration_usec < USEC_PER_MINUTE {
        (USEC_PER_SEC, "s")
    } else {
        return None;
    };

    let out = if duration_usec % magnitude == 0 {
        format!("{}{suffix}", duration_usec / magnitude)
    } else {
        format!("{:.1}{suffix}", duration_usec as f64 / magnitude as f64)
    };

    Some(out)
}

/// `[D day[s], ]H:MM:SS[.ffffff]`
pub fn format_day_clock(duration_usec: u64) -> String {
    let mut out = String::with_capacity(32);

    let days = duration_usec / USEC_PER_DAY;
    let micros = duration_usec % USEC_PER_SEC;
    let seconds = (duration_usec % USEC_PER_DAY) / USEC_PER_SEC;

    if days > 0 {
        swrite!(out, "{days} {}, ", plur_day!(days));
    }

    swrite!(
        out,
        "{}:{:02}:{:02}",
        seconds / SEC_PER_HOUR,
        (seconds % SEC_PER_HOUR) / SEC_PER_MINUTE,
        seconds % SEC_PER_MINUTE
    );

    if micros > 0 {
        swrite!(out, ".{micros:06}");
    }

    out
}

#[cfg(test)]
mod tests {

    use chrono::{Datelike, NaiveDateTime, Timelike};

    use super::*;

    #[test]
    fn test_short_duration() {
        let tests = [
            (0, "0us"),
            (500, "500us"),
            (999, "999us"),
            (1000, "1ms"),
            (1500, "1.5ms"),
            (250_000, "250ms"),
            (1_000_000, "1s"),
            (2_000_000, "2s"),
            (2_500_000, "2.5s"),
            (59_000_000, "59s"),
        ];

        for (usec, expected) in tests {
            assert_eq!(format_short_duration(usec).as_deref(), Some(expected));
        }

        assert_eq!(format_short_duration(60 * USEC_PER_SEC), None);
    }

    #[test]
    fn test_day_clock() {
        assert_eq!(format_day_clock(90 * USEC_PER_SEC), "0:01:30");
        assert_eq!(format_day_clock(3661 * USEC_PER_SEC + 5), "1:01:01.000005");
        assert_eq!(format_day_clock(USEC_PER_DAY), "1 day, 0:00:00");
        assert_eq!(
            format_day_clock(2 * USEC_PER_DAY + 13 * 3600 * USEC_PER_SEC),
            "2 days, 13:00:00"
        );
    }

    #[test]
    fn test_local_dates() {
        let ts_usec = 1_727_116_768_682_604;

        let truncated = format_local_date_sec(ts_usec).unwrap();
        let parsed = NaiveDateTime::parse_from_str(&truncated, DATE_FORMAT).unwrap();
        let expected = Local.timestamp_opt(1_727_116_768, 0).unwrap();
        assert_eq!(parsed.year(), expected.year());
        assert_eq!(parsed.second(), expected.second());

        let precise = format_local_date_usec(ts_usec).unwrap();
        assert!(precise.starts_with(&truncated), "{precise}");
        assert!(precise.ends_with(".682604"), "{precise}");

        let whole = format_local_date_usec(1_727_116_768 * USEC_PER_SEC).unwrap();
        assert_eq!(whole, truncated);
    }

    #[test]
    fn test_date_out_of_range() {
        assert_eq!(format_local_date_usec(u64::MAX - 1), None);
    }
}
