#[allow(dead_code)]
#[path = "../src/schedule.rs"]
mod schedule;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use proptest::prelude::*;
use schedule::{class_dates, is_class_date, weekday_name};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).expect("base date")
}

fn key(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

proptest! {
    #[test]
    fn derived_dates_are_sorted_scheduled_and_complete(
        start_off in 0i64..2000,
        len in 0i64..120,
        mask in prop::collection::vec(any::<bool>(), 7),
        break_offs in prop::collection::vec(0i64..120, 0..10),
    ) {
        let start = base() + Duration::days(start_off);
        let end = start + Duration::days(len);
        let days: Vec<&str> = WEEK
            .iter()
            .zip(&mask)
            .filter(|(_, on)| **on)
            .map(|(d, _)| weekday_name(*d))
            .collect();
        let breaks: Vec<String> = break_offs
            .iter()
            .map(|o| key(start + Duration::days(*o)))
            .collect();

        let got = class_dates(start, end, &days, &breaks);

        prop_assert!(got.windows(2).all(|w| w[0] < w[1]));
        for d in &got {
            prop_assert!(*d >= start && *d <= end);
            prop_assert!(!matches!(d.weekday(), Weekday::Sat | Weekday::Sun));
            prop_assert!(days.contains(&weekday_name(d.weekday())));
            prop_assert!(!breaks.contains(&key(*d)));
        }

        let mut day = start;
        while day <= end {
            let expected = days.contains(&weekday_name(day.weekday()))
                && !matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
                && !breaks.contains(&key(day));
            prop_assert_eq!(got.contains(&day), expected);
            prop_assert_eq!(is_class_date(day, start, end, &days, &breaks), expected);
            day += Duration::days(1);
        }
    }

    #[test]
    fn reversed_ranges_produce_nothing(start_off in 0i64..2000, back in 1i64..60) {
        let start = base() + Duration::days(start_off);
        let end = start - Duration::days(back);
        let got = class_dates(start, end, ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"], Vec::<String>::new());
        prop_assert!(got.is_empty());
    }

    #[test]
    fn timestamp_breaks_match_plain_dates(off in 0i64..60) {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("start");
        let end = start + Duration::days(60);
        let day = start + Duration::days(off);
        let plain = class_dates(start, end, ["Mon", "Wed", "Fri"], [key(day)]);
        let stamped = class_dates(start, end, ["Mon", "Wed", "Fri"], [format!("{}T00:00:00Z", key(day))]);
        prop_assert_eq!(plain, stamped);
    }
}
