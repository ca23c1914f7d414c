//! Class-date derivation from quarter bounds, weekly meeting days and breaks.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashSet;

/// Accepts full English day names and three-letter abbreviations, any case.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Reduces a stored break entry to its `YYYY-MM-DD` prefix.
pub fn normalize_date_key(raw: &str) -> String {
    let t = raw.trim();
    t.get(..10).unwrap_or(t).to_string()
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Every date in `[start, end]` that falls on one of `days`, is a weekday,
/// and is not listed in `breaks`. Ascending; empty when `start > end`.
pub fn class_dates<D, B>(start: NaiveDate, end: NaiveDate, days: D, breaks: B) -> Vec<NaiveDate>
where
    D: IntoIterator,
    D::Item: AsRef<str>,
    B: IntoIterator,
    B::Item: AsRef<str>,
{
    let meeting: HashSet<Weekday> = days
        .into_iter()
        .filter_map(|d| parse_weekday(d.as_ref()))
        .collect();
    if meeting.is_empty() || start > end {
        return Vec::new();
    }
    let excluded: HashSet<String> = breaks
        .into_iter()
        .map(|b| normalize_date_key(b.as_ref()))
        .collect();

    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        let wd = day.weekday();
        if meeting.contains(&wd)
            && !is_weekend(wd)
            && !excluded.contains(&day.format("%Y-%m-%d").to_string())
        {
            out.push(day);
        }
        day += Duration::days(1);
    }
    out
}

/// Whether `date` would be produced by [`class_dates`] for the same inputs.
pub fn is_class_date<D, B>(date: NaiveDate, start: NaiveDate, end: NaiveDate, days: D, breaks: B) -> bool
where
    D: IntoIterator,
    D::Item: AsRef<str>,
    B: IntoIterator,
    B::Item: AsRef<str>,
{
    class_dates(date.max(start), date.min(end), days, breaks)
        .first()
        .map(|d| *d == date)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    const NO_BREAKS: [&str; 0] = [];

    #[test]
    fn mondays_and_wednesdays_skip_break() {
        let got = class_dates(
            d(2024, 1, 1),
            d(2024, 1, 14),
            ["Monday", "Wednesday"],
            ["2024-01-08"],
        );
        assert_eq!(got, vec![d(2024, 1, 1), d(2024, 1, 3), d(2024, 1, 10)]);
    }

    #[test]
    fn empty_days_yield_nothing() {
        let days: [&str; 0] = [];
        assert!(class_dates(d(2024, 1, 1), d(2024, 3, 1), days, NO_BREAKS).is_empty());
    }

    #[test]
    fn inverted_range_yields_nothing() {
        assert!(class_dates(d(2024, 2, 1), d(2024, 1, 1), ["Monday"], NO_BREAKS).is_empty());
    }

    #[test]
    fn weekends_are_never_class_dates() {
        let got = class_dates(d(2024, 1, 1), d(2024, 1, 31), ["Saturday", "sun"], NO_BREAKS);
        assert!(got.is_empty());
    }

    #[test]
    fn break_on_unscheduled_day_has_no_effect() {
        let with = class_dates(d(2024, 1, 1), d(2024, 1, 14), ["Mon"], ["2024-01-09"]);
        let without = class_dates(d(2024, 1, 1), d(2024, 1, 14), ["Mon"], NO_BREAKS);
        assert_eq!(with, without);
    }

    #[test]
    fn timestamp_breaks_are_normalized() {
        let got = class_dates(
            d(2024, 1, 1),
            d(2024, 1, 14),
            ["monday"],
            ["2024-01-08T00:00:00.000Z"],
        );
        assert_eq!(got, vec![d(2024, 1, 1)]);
    }

    #[test]
    fn bounds_are_inclusive() {
        let got = class_dates(d(2024, 1, 1), d(2024, 1, 1), ["Monday"], NO_BREAKS);
        assert_eq!(got, vec![d(2024, 1, 1)]);
    }

    #[test]
    fn is_class_date_agrees_with_derivation() {
        let start = d(2024, 1, 1);
        let end = d(2024, 1, 14);
        assert!(is_class_date(d(2024, 1, 3), start, end, ["Wednesday"], NO_BREAKS));
        assert!(!is_class_date(d(2024, 1, 4), start, end, ["Wednesday"], NO_BREAKS));
        assert!(!is_class_date(d(2024, 1, 10), start, end, ["Wednesday"], ["2024-01-10"]));
        assert!(!is_class_date(d(2024, 1, 17), start, end, ["Wednesday"], NO_BREAKS));
    }

    #[test]
    fn weekday_names_roundtrip() {
        for wd in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri] {
            assert_eq!(parse_weekday(weekday_name(wd)), Some(wd));
        }
        assert_eq!(parse_weekday("Funday"), None);
    }
}
