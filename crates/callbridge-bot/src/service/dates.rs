use callbridge_core::error::{BridgeError, Result};
use chrono::{Datelike, Duration, FixedOffset, NaiveDate, TimeDelta, Utc, Weekday};

/// Current calendar date at a fixed UTC offset (hours).
pub fn today(utc_offset_hours: i32) -> NaiveDate {
    match FixedOffset::east_opt(utc_offset_hours * 3600) {
        Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
        None => Utc::now().date_naive(),
    }
}

const FULL_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d %B %Y", "%d %b %Y", "%B %d %Y",
    "%b %d %Y", "%B %d, %Y", "%b %d, %Y",
];

/// Formats without a year; the current year is assumed.
const YEARLESS_FORMATS: &[&str] = &["%d %B", "%d %b", "%B %d", "%b %d", "%d/%m"];

/// Parse a user-supplied report date relative to `today`.
///
/// Accepts `today`, `yesterday`, `YYYY-MM-DD`, and a handful of natural
/// forms: `N days ago`, weekday names (most recent past one), `last friday`,
/// `1 July 2025`, `Jul 1`, `01/07/2025`.
pub fn parse_date(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    let text = input.trim().to_lowercase();
    let text = text.trim_end_matches('.');
    if text.is_empty() {
        return Err(BridgeError::DateParse("empty date".to_string()));
    }

    match text {
        "today" | "now" => return Ok(today),
        "yesterday" => return Ok(today - Duration::days(1)),
        _ => {}
    }

    if let Some(n) = text
        .strip_suffix("days ago")
        .or_else(|| text.strip_suffix("day ago"))
    {
        return days_before(today, n.trim())
            .ok_or_else(|| BridgeError::DateParse(input.trim().to_string()));
    }

    let weekday_text = text.strip_prefix("last ").unwrap_or(text);
    if let Ok(weekday) = weekday_text.parse::<Weekday>() {
        return Ok(most_recent(weekday, today));
    }

    for fmt in FULL_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Ok(date);
        }
    }

    let with_year = format!("{text} {}", today.year());
    for fmt in YEARLESS_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&with_year, &format!("{fmt} %Y")) {
            return Ok(date);
        }
    }

    Err(BridgeError::DateParse(input.trim().to_string()))
}

/// `today` minus a non-negative day count, `None` when out of range.
fn days_before(today: NaiveDate, count: &str) -> Option<NaiveDate> {
    let n = i64::try_from(count.parse::<u64>().ok()?).ok()?;
    today.checked_sub_signed(TimeDelta::try_days(n)?)
}

/// The latest `weekday` strictly before `today`.
fn most_recent(weekday: Weekday, today: NaiveDate) -> NaiveDate {
    let back = (today.weekday().num_days_from_monday() + 7 - weekday.num_days_from_monday()) % 7;
    let back = if back == 0 { 7 } else { back };
    today - Duration::days(i64::from(back))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // Tuesday
    fn base() -> NaiveDate {
        d(2025, 7, 1)
    }

    #[test]
    fn test_keywords() {
        assert_eq!(parse_date("today", base()).unwrap(), base());
        assert_eq!(parse_date(" Yesterday ", base()).unwrap(), d(2025, 6, 30));
    }

    #[test]
    fn test_iso() {
        assert_eq!(parse_date("2025-06-15", base()).unwrap(), d(2025, 6, 15));
        assert!(parse_date("2025-13-01", base()).is_err());
    }

    #[test]
    fn test_natural_forms() {
        assert_eq!(parse_date("3 days ago", base()).unwrap(), d(2025, 6, 28));
        assert_eq!(parse_date("friday", base()).unwrap(), d(2025, 6, 27));
        assert_eq!(parse_date("last tuesday", base()).unwrap(), d(2025, 6, 24));
        assert_eq!(parse_date("1 July 2025", base()).unwrap(), d(2025, 7, 1));
        assert_eq!(parse_date("Jun 20", base()).unwrap(), d(2025, 6, 20));
        assert_eq!(parse_date("15/06/2025", base()).unwrap(), d(2025, 6, 15));
    }

    #[test]
    fn test_garbage_is_date_parse_error() {
        let err = parse_date("next blue moon", base()).unwrap_err();
        assert!(matches!(err, BridgeError::DateParse(ref s) if s == "next blue moon"));
        assert!(matches!(parse_date("  ", base()), Err(BridgeError::DateParse(_))));
    }

    #[test]
    fn test_out_of_range_day_counts() {
        for input in ["99999999 days ago", "999999999999999 days ago", "-3 days ago", "x days ago"] {
            let err = parse_date(input, base()).unwrap_err();
            assert!(matches!(err, BridgeError::DateParse(ref s) if s == input), "{input}");
        }
        assert_eq!(parse_date("0 days ago", base()).unwrap(), base());
        assert_eq!(parse_date("1 day ago", base()).unwrap(), d(2025, 6, 30));
    }
}
