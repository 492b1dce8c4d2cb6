// ===============================
// src/holidays.rs (Norwegian public holidays)
// ===============================
//
// Moveable feasts hang off Easter Sunday (anonymous Gregorian algorithm):
//   Palm Sunday -7, Maundy Thursday -3, Good Friday -2, Easter Sunday 0,
//   Easter Monday +1, Ascension +39, Whit Sunday +49, Whit Monday +50.
// Fixed dates: Jan 1, May 1, May 17, Dec 25, Dec 26.
//
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: &'static str,
}

const EASTER_OFFSETS: [(i64, &str); 8] = [
    (-7, "Palm Sunday"),
    (-3, "Maundy Thursday"),
    (-2, "Good Friday"),
    (0, "Easter Sunday"),
    (1, "Easter Monday"),
    (39, "Ascension Day"),
    (49, "Whit Sunday"),
    (50, "Whit Monday"),
];

const FIXED: [(u32, u32, &str); 5] = [
    (1, 1, "New Year's Day"),
    (5, 1, "Labour Day"),
    (5, 17, "Constitution Day"),
    (12, 25, "Christmas Day"),
    (12, 26, "Boxing Day"),
];

/// Easter Sunday for a given year, anonymous Gregorian algorithm (Computus).
pub fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = ((h + l - 7 * m + 114) % 31) + 1;

    // month is always 3 or 4, day 1..=31 within that month
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).unwrap_or(NaiveDate::MIN)
}

/// All holidays of `year`, sorted by date.
pub fn holidays_for_year(year: i32) -> Vec<Holiday> {
    let easter = easter_sunday(year);
    let mut out: Vec<Holiday> = EASTER_OFFSETS
        .iter()
        .map(|(offset, name)| Holiday { date: easter + Duration::days(*offset), name: *name })
        .chain(FIXED.iter().filter_map(|(m, d, name)| {
            NaiveDate::from_ymd_opt(year, *m, *d).map(|date| Holiday { date, name: *name })
        }))
        .collect();
    out.sort_by_key(|h| h.date);
    out
}

pub fn holiday_name(date: NaiveDate) -> Option<&'static str> {
    if let Some((_, _, name)) = FIXED
        .iter()
        .find(|(m, d, _)| date.month() == *m && date.day() == *d)
    {
        return Some(*name);
    }
    let offset = (date - easter_sunday(date.year())).num_days();
    EASTER_OFFSETS
        .iter()
        .find(|(o, _)| *o == offset)
        .map(|(_, name)| *name)
}

pub fn is_holiday(date: NaiveDate) -> bool {
    holiday_name(date).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn easter_dates() {
        // Known Easter dates from published sources
        assert_eq!(easter_sunday(2019), d(2019, 4, 21));
        assert_eq!(easter_sunday(2020), d(2020, 4, 12));
        assert_eq!(easter_sunday(2021), d(2021, 4, 4));
        assert_eq!(easter_sunday(2022), d(2022, 4, 17));
        assert_eq!(easter_sunday(2023), d(2023, 4, 9));
        assert_eq!(easter_sunday(2024), d(2024, 3, 31));
        assert_eq!(easter_sunday(2025), d(2025, 4, 20));
        assert_eq!(easter_sunday(2026), d(2026, 4, 5));
        assert_eq!(easter_sunday(2027), d(2027, 3, 28));
    }

    #[test]
    fn christmas_is_always_a_holiday() {
        for year in 1990..2060 {
            assert!(is_holiday(d(year, 12, 25)));
            assert!(is_holiday(d(year, 12, 26)));
            assert!(!is_holiday(d(year, 12, 27)));
        }
    }

    #[test]
    fn moveable_feasts_2024() {
        assert_eq!(holiday_name(d(2024, 3, 24)), Some("Palm Sunday"));
        assert_eq!(holiday_name(d(2024, 3, 28)), Some("Maundy Thursday"));
        assert_eq!(holiday_name(d(2024, 3, 29)), Some("Good Friday"));
        assert_eq!(holiday_name(d(2024, 4, 1)), Some("Easter Monday"));
        assert_eq!(holiday_name(d(2024, 5, 9)), Some("Ascension Day"));
        assert_eq!(holiday_name(d(2024, 5, 19)), Some("Whit Sunday"));
        assert_eq!(holiday_name(d(2024, 5, 20)), Some("Whit Monday"));
        assert!(!is_holiday(d(2024, 3, 30)));
    }

    #[test]
    fn year_table_has_thirteen_sorted_days() {
        let table = holidays_for_year(2025);
        assert_eq!(table.len(), 13);
        assert_eq!(table[0].date, d(2025, 1, 1));
        assert!(table.windows(2).all(|w| w[0].date <= w[1].date));
        assert!(table.iter().all(|h| is_holiday(h.date)));
    }
}
