//! Flexible date parsing for heterogeneous date columns.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// How ambiguous numeric dates like `03/04/2024` are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOrder {
    DayFirst,
    MonthFirst,
}

/// Unambiguous date formats, tried first under either order.
const COMMON_DATES: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%b %d %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const COMMON_DATETIMES: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DAY_FIRST_DATES: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y", "%d-%m-%y", "%d.%m.%y",
];

const DAY_FIRST_DATETIMES: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];

const MONTH_FIRST_DATES: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y", "%m/%d/%y", "%m-%d-%y"];

const MONTH_FIRST_DATETIMES: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];

/// Month-only formats; parsed as the first day of the month.
const MONTH_ONLY: &[&str] = &["%Y-%m", "%Y/%m", "%b %Y", "%B %Y", "%b-%Y", "%m/%Y"];

/// Parse a date, trying formats in a fixed order. The first format that
/// matches wins.
pub fn parse_date(input: &str, order: DayOrder) -> Option<NaiveDate> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Some(d) = first_date(s, COMMON_DATES) {
        return Some(d);
    }
    if let Some(d) = first_datetime(s, COMMON_DATETIMES) {
        return Some(d);
    }
    let (dates, datetimes) = match order {
        DayOrder::DayFirst => (DAY_FIRST_DATES, DAY_FIRST_DATETIMES),
        DayOrder::MonthFirst => (MONTH_FIRST_DATES, MONTH_FIRST_DATETIMES),
    };
    if let Some(d) = first_date(s, dates) {
        return Some(d);
    }
    if let Some(d) = first_datetime(s, datetimes) {
        return Some(d);
    }
    MONTH_ONLY.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(&format!("{} 01", s), &format!("{} %d", fmt))
            .ok()
            .filter(|d| plausible(*d))
    })
}

/// `%Y` accepts short years, so `03/04/24` would otherwise parse as year 3.
fn plausible(date: NaiveDate) -> bool {
    date.year() >= 1000
}

fn first_date(s: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            .filter(|d| plausible(*d))
    })
}

fn first_datetime(s: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|dt| dt.date())
            .filter(|d| plausible(*d))
    })
}

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

/// Month end `months` months after the month of `date`.
pub fn add_months_end(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(chrono::Months::new(months))
        .map(month_end)
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso_and_rfc3339() {
        assert_eq!(parse_date("2024-03-15", DayOrder::DayFirst), Some(ymd(2024, 3, 15)));
        assert_eq!(
            parse_date("2024-03-15T10:20:30Z", DayOrder::DayFirst),
            Some(ymd(2024, 3, 15))
        );
        assert_eq!(
            parse_date("2024-03-15 10:20:30", DayOrder::MonthFirst),
            Some(ymd(2024, 3, 15))
        );
    }

    #[test]
    fn test_day_order() {
        assert_eq!(parse_date("03/04/2024", DayOrder::DayFirst), Some(ymd(2024, 4, 3)));
        assert_eq!(parse_date("03/04/2024", DayOrder::MonthFirst), Some(ymd(2024, 3, 4)));
        assert_eq!(parse_date("03/04/24", DayOrder::DayFirst), Some(ymd(2024, 4, 3)));
        assert_eq!(parse_date("12/25/2024", DayOrder::DayFirst), None);
        assert_eq!(parse_date("12/25/2024", DayOrder::MonthFirst), Some(ymd(2024, 12, 25)));
    }

    #[test]
    fn test_named_months() {
        assert_eq!(parse_date("5 Jan 2023", DayOrder::DayFirst), Some(ymd(2023, 1, 5)));
        assert_eq!(parse_date("January 5, 2023", DayOrder::DayFirst), Some(ymd(2023, 1, 5)));
        assert_eq!(parse_date("Mar 2023", DayOrder::DayFirst), Some(ymd(2023, 3, 1)));
        assert_eq!(parse_date("2023-07", DayOrder::DayFirst), Some(ymd(2023, 7, 1)));
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse_date("", DayOrder::DayFirst), None);
        assert_eq!(parse_date("not a date", DayOrder::DayFirst), None);
        assert_eq!(parse_date("42", DayOrder::MonthFirst), None);
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(ymd(2024, 2, 10)), ymd(2024, 2, 29));
        assert_eq!(month_end(ymd(2023, 12, 1)), ymd(2023, 12, 31));
        assert_eq!(add_months_end(ymd(2023, 11, 30), 2), ymd(2024, 1, 31));
        assert_eq!(add_months_end(ymd(2024, 1, 31), 1), ymd(2024, 2, 29));
    }
}
