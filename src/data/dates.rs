//! Calendar arithmetic for status records and enrollment checks.
//!
//! All welfare statuses carry day-granular validity ranges; whether a record
//! counts as active is always derived from its dates against a reference day,
//! never stored.

use chrono::{Datelike, NaiveDate};

/// Derived state of a dated status record at a reference day.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Activity {
    Active,
    Expired,
}

/// Classifies a `(start, end)` range against a reference day.
///
/// The end day is inclusive: a record ending exactly on `as_of` is still
/// active. Records starting after `as_of` classify as neither (`None`).
pub fn classify(start: NaiveDate, end: Option<NaiveDate>, as_of: NaiveDate) -> Option<Activity> {
    if start > as_of {
        return None;
    }

    match end {
        Some(end) if end < as_of => Some(Activity::Expired),
        _ => Some(Activity::Active),
    }
}

/// Same calendar day `years` earlier; Feb 29 clamps to Feb 28.
pub fn years_before(date: NaiveDate, years: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year() - years, date.month(), date.day()).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(date.year() - years, 2, 28)
            .expect("Feb 28 exists in every year")
    })
}

/// Whether a person born on `birth` is at least 18 on `as_of`,
/// by calendar comparison rather than year arithmetic.
pub fn is_adult_on(birth: NaiveDate, as_of: NaiveDate) -> bool {
    birth <= years_before(as_of, 18)
}

/// The academic window `[admission-09-01, graduation-08-31]`, both inclusive.
pub fn enrollment_window(admission_year: i32, graduation_year: i32) -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(admission_year, 9, 1).expect("Sep 1 exists in every year"),
        NaiveDate::from_ymd_opt(graduation_year, 8, 31).expect("Aug 31 exists in every year"),
    )
}

/// Whether `as_of` falls inside the student's academic window. Students
/// without a graduation year never match.
pub fn is_enrolled_on(
    admission_year: i32,
    graduation_year: Option<i32>,
    as_of: NaiveDate,
) -> bool {
    match graduation_year {
        Some(graduation) => {
            let (from, until) = enrollment_window(admission_year, graduation);
            from <= as_of && as_of <= until
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn open_ended_record_is_active_from_start() {
        assert_eq!(
            classify(d(2024, 1, 1), None, d(2024, 6, 1)),
            Some(Activity::Active)
        );
        // Start day itself counts.
        assert_eq!(
            classify(d(2024, 6, 1), None, d(2024, 6, 1)),
            Some(Activity::Active)
        );
    }

    #[test]
    fn record_starting_in_the_future_is_neither() {
        assert_eq!(classify(d(2024, 7, 1), None, d(2024, 6, 1)), None);
        assert_eq!(
            classify(d(2024, 7, 1), Some(d(2024, 8, 1)), d(2024, 6, 1)),
            None
        );
    }

    #[test]
    fn end_day_is_inclusive() {
        assert_eq!(
            classify(d(2024, 1, 1), Some(d(2024, 6, 1)), d(2024, 6, 1)),
            Some(Activity::Active)
        );
        assert_eq!(
            classify(d(2024, 1, 1), Some(d(2024, 5, 31)), d(2024, 6, 1)),
            Some(Activity::Expired)
        );
    }

    #[test]
    fn ended_record_never_classifies_active() {
        for start in [d(2020, 1, 1), d(2023, 5, 31)] {
            assert_eq!(
                classify(start, Some(d(2023, 6, 1)), d(2024, 6, 1)),
                Some(Activity::Expired)
            );
        }
    }

    #[test]
    fn adulthood_is_a_calendar_comparison() {
        let as_of = d(2024, 6, 1);
        assert!(is_adult_on(d(2006, 6, 1), as_of));
        assert!(!is_adult_on(d(2006, 6, 2), as_of));
    }

    #[test]
    fn leap_day_reference_clamps_to_feb_28() {
        // 2006-02-29 doesn't exist, so the cutoff becomes 2006-02-28.
        assert_eq!(years_before(d(2024, 2, 29), 18), d(2006, 2, 28));
        assert!(is_adult_on(d(2006, 2, 28), d(2024, 2, 29)));
        assert!(!is_adult_on(d(2006, 3, 1), d(2024, 2, 29)));
    }

    #[test]
    fn leap_day_births_come_of_age_in_march() {
        assert!(!is_adult_on(d(2004, 2, 29), d(2022, 2, 28)));
        assert!(is_adult_on(d(2004, 2, 29), d(2022, 3, 1)));
    }

    #[test]
    fn enrollment_window_bounds_are_inclusive() {
        assert!(is_enrolled_on(2021, Some(2025), d(2021, 9, 1)));
        assert!(is_enrolled_on(2021, Some(2025), d(2025, 8, 31)));
        assert!(!is_enrolled_on(2021, Some(2025), d(2021, 8, 31)));
        assert!(!is_enrolled_on(2021, Some(2025), d(2025, 9, 1)));
    }

    #[test]
    fn missing_graduation_year_never_counts_as_enrolled() {
        assert!(!is_enrolled_on(2021, None, d(2022, 1, 1)));
    }
}
