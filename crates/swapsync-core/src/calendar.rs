//! # Broadcast Calendar
//!
//! Fixed-date Ghanaian public holidays and the month-start rule used by the
//! scheduler's daily broadcast job.

use chrono::{Datelike, NaiveDate};

/// `(month, day, name)` for every fixed-date holiday.
pub const GHANA_HOLIDAYS: &[(u32, u32, &str)] = &[
    (1, 1, "New Year's Day"),
    (1, 7, "Constitution Day"),
    (3, 6, "Independence Day"),
    (5, 1, "May Day"),
    (7, 1, "Republic Day"),
    (8, 4, "Founders' Day"),
    (9, 21, "Kwame Nkrumah Memorial Day"),
    (12, 25, "Christmas Day"),
    (12, 26, "Boxing Day"),
];

/// Holiday name for `date`, if any.
pub fn ghana_holiday(date: NaiveDate) -> Option<&'static str> {
    GHANA_HOLIDAYS
        .iter()
        .find(|(m, d, _)| *m == date.month() && *d == date.day())
        .map(|(_, _, name)| *name)
}

/// First day of a month.
pub fn is_month_start(date: NaiveDate) -> bool {
    date.day() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_holidays() {
        assert_eq!(ghana_holiday(d(2024, 3, 6)), Some("Independence Day"));
        assert_eq!(ghana_holiday(d(2025, 12, 26)), Some("Boxing Day"));
        assert_eq!(ghana_holiday(d(2024, 3, 7)), None);
    }

    #[test]
    fn test_new_year_is_both() {
        let date = d(2025, 1, 1);
        assert!(is_month_start(date));
        assert_eq!(ghana_holiday(date), Some("New Year's Day"));
        assert!(!is_month_start(d(2025, 1, 2)));
    }
}
