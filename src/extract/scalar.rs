//! Scalar parsing for extracted text: numbers as they appear on real pages
//! (thousands separators, currency noise, full-width spaces) and timestamps
//! with explicit formats.

use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9,]*(?:\.[0-9]*)?").unwrap());

fn parse_number_error(text: &str) -> Error {
    Error::ParseNumber {
        text: text.to_string(),
    }
}

/// Longest leading signed-integer prefix, so `"42nd"` parses as 42 the way
/// a scanf-style reader would.
fn leading_int(s: &str) -> &str {
    let mut end = 0;
    for (i, c) in s.char_indices() {
        if (i == 0 && (c == '+' || c == '-')) || c.is_ascii_digit() {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    &s[..end]
}

/// Parses a signed integer, tolerating whitespace and `,` separators.
pub fn parse_int(s: &str) -> Result<i64> {
    let cleaned = s.trim().replace(',', "");
    leading_int(&cleaned)
        .parse()
        .map_err(|_| parse_number_error(s))
}

pub fn parse_uint(s: &str) -> Result<u64> {
    let cleaned = s.trim().replace(',', "");
    leading_int(&cleaned)
        .parse()
        .map_err(|_| parse_number_error(s))
}

/// Extracts the first numeric run from arbitrary text and parses it as a
/// float. `,`, U+00A0 and U+3000 are stripped from the run.
pub fn extract_number(s: &str) -> Result<f64> {
    let run = NUMBER_RUN_RE
        .find(s)
        .ok_or_else(|| parse_number_error(s))?
        .as_str();
    let cleaned: String = run
        .chars()
        .filter(|c| !matches!(c, ',' | '\u{00a0}' | '\u{3000}'))
        .collect();
    cleaned.parse().map_err(|_| parse_number_error(s))
}

/// Parses a timestamp with a chrono format string, in the given fixed
/// offset (UTC when absent).
pub fn parse_time(s: &str, format: &str, tz: Option<FixedOffset>) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), format)?;
    match tz {
        None => Ok(Utc.from_utc_datetime(&naive)),
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| Error::Extract(format!("ambiguous local time {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn int_strips_commas_and_whitespace() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int(" 123,456 ").unwrap(), 123_456);
        assert_eq!(parse_int("-1,000").unwrap(), -1000);
        assert_eq!(parse_uint("654321").unwrap(), 654_321);
    }

    #[test]
    fn int_accepts_trailing_noise_but_not_garbage() {
        assert_eq!(parse_int("12,345th").unwrap(), 12_345);
        let err = parse_int("US").unwrap_err();
        assert_eq!(err.to_string(), "expected number, got \"US\"");
    }

    #[test]
    fn float_takes_first_numeric_run() {
        assert_eq!(extract_number("3.14159265").unwrap(), 3.14159265);
        assert_eq!(extract_number("1,234.5 円").unwrap(), 1234.5);
        assert_eq!(extract_number("¥1,234").unwrap(), 1234.0);
        assert_eq!(extract_number("12\u{00a0}345").unwrap(), 12.0);
        assert!(extract_number("test").is_err());
    }

    #[test]
    fn time_parses_in_utc_by_default() {
        let t = parse_time("1986/4/1 12:34", "%Y/%-m/%-d %H:%M", None).unwrap();
        let expected = NaiveDate::from_ymd_opt(1986, 4, 1)
            .unwrap()
            .and_hms_opt(12, 34, 0)
            .unwrap();
        assert_eq!(t.naive_utc(), expected);
    }

    #[test]
    fn time_honors_fixed_offset() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let t = parse_time("1999/04/01 12:34", "%Y/%m/%d %H:%M", Some(jst)).unwrap();
        let expected = NaiveDate::from_ymd_opt(1999, 4, 1)
            .unwrap()
            .and_hms_opt(3, 34, 0)
            .unwrap();
        assert_eq!(t.naive_utc(), expected);
    }

    #[test]
    fn bad_time_is_an_error() {
        assert!(parse_time("abc", "%Y/%m/%d", None).is_err());
    }
}
