//! HTTP date parsing for `Expires` cookie attributes and friends.
//!
//! Accepts the three formats servers actually emit:
//!
//! * RFC 1123: `Sun, 06 Nov 1994 08:49:37 GMT`
//! * RFC 850 with dashed date (short or long weekday, 2 or 4 digit year):
//!   `Sunday, 06-Nov-94 08:49:37 GMT`
//! * asctime: `Sun Nov  6 08:49:37 1994`
//!
//! The named weekday must agree with the date. A date that claims the wrong
//! weekday is rejected rather than silently accepted.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::Error;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// indexed 0 = Sunday
const WEEKDAYS_SHORT: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const WEEKDAYS_LONG: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Parse an HTTP date in any accepted format to a point in time.
pub fn parse_http_date(input: &str) -> Result<SystemTime, Error> {
    let input = input.trim();

    let (weekday, date) = if let Some(comma) = input.find(',') {
        let weekday = &input[..comma];
        let rest = input[comma + 1..].trim_start();
        (weekday, parse_imf_or_850(rest)?)
    } else {
        parse_asctime(input)?
    };

    let wanted = weekday_index(weekday)
        .ok_or_else(|| Error::parse(format!("bad weekday: {}", weekday)))?;
    if wanted != date.weekday() {
        return Err(Error::parse(format!(
            "weekday does not match date: {}",
            input
        )));
    }

    Ok(date.to_system_time())
}

struct CivilDateTime {
    year: i64,
    month: u32, // 1-12
    day: u32,
    hour: u64,
    minute: u64,
    second: u64,
}

impl CivilDateTime {
    fn validated(self) -> Result<Self, Error> {
        let ok = self.month >= 1
            && self.month <= 12
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 61;
        if ok {
            Ok(self)
        } else {
            Err(Error::parse("date out of range"))
        }
    }

    fn unix_seconds(&self) -> i64 {
        days_from_civil(self.year, self.month, self.day) * 86_400
            + (self.hour * 3600 + self.minute * 60 + self.second) as i64
    }

    // 0 = Sunday. 1970-01-01 was a Thursday.
    fn weekday(&self) -> usize {
        let days = days_from_civil(self.year, self.month, self.day);
        (((days + 4) % 7 + 7) % 7) as usize
    }

    fn to_system_time(&self) -> SystemTime {
        let secs = self.unix_seconds();
        if secs <= 0 {
            // pre-epoch expiry means "expired"; the exact instant is moot
            UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
        } else {
            UNIX_EPOCH + Duration::from_secs(secs as u64)
        }
    }
}

// "06 Nov 1994 08:49:37 GMT" or "06-Nov-94 08:49:37 GMT"
fn parse_imf_or_850(rest: &str) -> Result<CivilDateTime, Error> {
    let toks: Vec<&str> = rest.split_whitespace().collect();

    let (day, month, year, time) = match toks.as_slice() {
        [day, month, year, time, "GMT"] => {
            (parse_num(day)?, month_index(month)?, parse_num(year)?, *time)
        }
        [date, time, "GMT"] if date.contains('-') => {
            let mut it = date.split('-');
            let day = it.next().ok_or_else(|| Error::parse("bad date"))?;
            let month = it.next().ok_or_else(|| Error::parse("bad date"))?;
            let year = it.next().ok_or_else(|| Error::parse("bad date"))?;
            if it.next().is_some() {
                return Err(Error::parse("bad date"));
            }
            (parse_num(day)?, month_index(month)?, parse_num(year)?, *time)
        }
        _ => return Err(Error::parse(format!("unrecognized date: {}", rest))),
    };

    let (hour, minute, second) = parse_time(time)?;
    CivilDateTime {
        year: expand_year(year),
        month,
        day: day as u32,
        hour,
        minute,
        second,
    }
    .validated()
}

// "Sun Nov  6 08:49:37 1994"
fn parse_asctime(input: &str) -> Result<(&str, CivilDateTime), Error> {
    let toks: Vec<&str> = input.split_whitespace().collect();

    let (weekday, date) = match toks.as_slice() {
        [weekday, month, day, time, year] => {
            let (hour, minute, second) = parse_time(time)?;
            (
                *weekday,
                CivilDateTime {
                    year: parse_num(year)? as i64,
                    month: month_index(month)?,
                    day: parse_num(day)? as u32,
                    hour,
                    minute,
                    second,
                },
            )
        }
        _ => return Err(Error::parse(format!("unrecognized date: {}", input))),
    };

    Ok((weekday, date.validated()?))
}

fn parse_time(time: &str) -> Result<(u64, u64, u64), Error> {
    let mut it = time.split(':');
    let hour = parse_num(it.next().ok_or_else(|| Error::parse("bad time"))?)?;
    let minute = parse_num(it.next().ok_or_else(|| Error::parse("bad time"))?)?;
    let second = parse_num(it.next().ok_or_else(|| Error::parse("bad time"))?)?;
    if it.next().is_some() {
        return Err(Error::parse("bad time"));
    }
    Ok((hour, minute, second))
}

fn parse_num(s: &str) -> Result<u64, Error> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::parse(format!("expected digits: {}", s)));
    }
    s.parse().map_err(|_| Error::parse("number out of range"))
}

// two digit years pivot at 70 per RFC 6265 §5.1.1
fn expand_year(year: u64) -> i64 {
    match year {
        0..=69 => (year + 2000) as i64,
        70..=99 => (year + 1900) as i64,
        y => y as i64,
    }
}

fn month_index(name: &str) -> Result<u32, Error> {
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| i as u32 + 1)
        .ok_or_else(|| Error::parse(format!("bad month: {}", name)))
}

fn weekday_index(name: &str) -> Option<usize> {
    WEEKDAYS_SHORT
        .iter()
        .position(|w| w.eq_ignore_ascii_case(name))
        .or_else(|| {
            WEEKDAYS_LONG
                .iter()
                .position(|w| w.eq_ignore_ascii_case(name))
        })
}

fn is_leap(year: i64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap(year) => 29,
        2 => 28,
        _ => 0,
    }
}

// days since 1970-01-01, proleptic gregorian
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = ((153 * mp + 2) / 5 + day - 1) as i64;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod test {
    use super::*;

    fn secs(input: &str) -> u64 {
        parse_http_date(input)
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn rfc1123() {
        assert_eq!(secs("Sun, 06 Nov 1994 08:49:37 GMT"), 784_111_777);
        assert_eq!(secs("Tue, 03 Oct 2023 12:11:15 GMT"), 1_696_335_075);
        assert_eq!(secs("Wed, 09 Jun 2021 10:18:14 GMT"), 1_623_233_894);
        assert_eq!(secs("Wed, 13 Jan 2021 22:23:01 GMT"), 1_610_576_581);
        assert_eq!(secs("Thu, 01 Jan 1970 00:00:01 GMT"), 1);
    }

    #[test]
    fn rfc850_dashed() {
        assert_eq!(secs("Thu, 01-Jan-1970 00:00:00 GMT"), 0);
        assert_eq!(secs("Thu, 01-Jan-1970 01:00:00 GMT"), 3600);
        assert_eq!(secs("Sunday, 06-Nov-94 08:49:37 GMT"), 784_111_777);
    }

    #[test]
    fn asctime() {
        assert_eq!(secs("Sun Nov  6 08:49:37 1994"), 784_111_777);
        assert_eq!(secs("Thu Jan 1 00:00:01 1970"), 1);
    }

    #[test]
    fn wrong_weekday_is_rejected() {
        assert!(parse_http_date("Mon, 06 Nov 1994 08:49:37 GMT").is_err());
        assert!(parse_http_date("Sun, 03 Oct 2023 12:11:15 GMT").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_http_date("not a date").is_err());
        assert!(parse_http_date("Sun, 32 Nov 1994 08:49:37 GMT").is_err());
        assert!(parse_http_date("Sun, 06 Nov 1994 24:00:00 GMT").is_err());
        assert!(parse_http_date("Sun, 06 Nov 1994 08:49:37 PST").is_err());
        assert!(parse_http_date("Tue, 29 Feb 2023 00:00:00 GMT").is_err());
    }

    #[test]
    fn leap_day() {
        assert_eq!(secs("Thu, 29 Feb 2024 00:00:00 GMT"), 1_709_164_800);
    }
}
