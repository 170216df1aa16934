use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Monday through Friday. Exchange holidays are not modeled.
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Returns the `n` business days strictly after `last`, in ascending order.
pub fn business_days_after(last: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut current = last;
    while out.len() < n {
        current = match current.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
        if is_business_day(current) {
            out.push(current);
        }
    }
    out
}

/// Business days in the half-open range `[start, end)`.
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d < end)
        .filter(|d| is_business_day(*d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn after_friday_skips_weekend() {
        // 2023-12-29 is a Friday
        let days = business_days_after(date(2023, 12, 29), 3);
        assert_eq!(days, vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)]);
    }

    #[test]
    fn after_weekend_starts_monday() {
        let days = business_days_after(date(2024, 1, 6), 1);
        assert_eq!(days, vec![date(2024, 1, 8)]);
    }

    #[test]
    fn thirty_days_are_strictly_increasing_weekdays() {
        let last = date(2023, 12, 28);
        let days = business_days_after(last, 30);
        assert_eq!(days.len(), 30);
        assert!(days[0] > last);
        assert!(days.iter().all(|d| is_business_day(*d)));
        assert!(days.windows(2).all(|w| w[0] < w[1]));
        // Consecutive: no weekday is skipped between neighbours.
        for w in days.windows(2) {
            let gap = (w[1] - w[0]).num_days();
            if w[0].weekday() == Weekday::Fri {
                assert_eq!(gap, 3);
            } else {
                assert_eq!(gap, 1);
            }
        }
    }

    #[test]
    fn between_is_half_open() {
        // Mon 2024-01-01 .. Mon 2024-01-08 (exclusive)
        let days = business_days_between(date(2024, 1, 1), date(2024, 1, 8));
        assert_eq!(days.len(), 5);
        assert_eq!(days.first(), Some(&date(2024, 1, 1)));
        assert_eq!(days.last(), Some(&date(2024, 1, 5)));
    }

    #[test]
    fn between_empty_when_reversed() {
        assert!(business_days_between(date(2024, 2, 1), date(2024, 1, 1)).is_empty());
        assert!(business_days_between(date(2024, 1, 1), date(2024, 1, 1)).is_empty());
    }
}
