use chrono::{Datelike, NaiveDate};

/// Number of calendar months between "today" and a target month. The DNB
/// archive addresses statements by this offset: 0 is the current month,
/// 1 the month before, and so on.
pub type MonthOffset = i32;

/// Pure calendar-month arithmetic. Day-of-month must not influence the
/// result, so this is year*12+month subtraction, not elapsed days.
pub fn month_offset(today: NaiveDate, target: NaiveDate) -> MonthOffset {
    (today.year() - target.year()) * 12 + (today.month() as i32 - target.month() as i32)
}

/// Turns a `(from, to)` month range into the descending list of offsets the
/// archive has to be asked for: `offset(from), offset(from)-1, ..,
/// offset(to)+1`. The `to` boundary is exclusive, so `from == to` yields an
/// empty window.
pub fn resolve_window(today: NaiveDate, from: NaiveDate, to: NaiveDate) -> Vec<MonthOffset> {
    let first = month_offset(today, from);
    let last = month_offset(today, to);
    (last + 1..=first).rev().collect()
}

/// The months of one account that don't have a statement on disk yet.
///
/// Mutated only by removal. Sweeps iterate over a `snapshot` and apply their
/// removals in one go afterwards, so mid-sweep discoveries never change the
/// months a running sweep visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMonths {
    months: Vec<MonthOffset>,
}

impl PendingMonths {
    pub fn new(months: Vec<MonthOffset>) -> Self {
        Self { months }
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    /// A fixed copy of the currently pending offsets for one sweep to iterate.
    pub fn snapshot(&self) -> Vec<MonthOffset> {
        self.months.clone()
    }

    pub fn contains(&self, offset: MonthOffset) -> bool {
        self.months.contains(&offset)
    }

    pub fn remove_all(&mut self, resolved: &[MonthOffset]) {
        self.months.retain(|month| !resolved.contains(month));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, 1).unwrap()
    }

    #[test]
    fn offset_of_current_month_is_zero() {
        assert_eq!(0, month_offset(date(2024, 3), date(2024, 3)));
    }

    #[test]
    fn offset_counts_calendar_months() {
        assert_eq!(14, month_offset(date(2024, 3), date(2023, 1)));
        assert_eq!(1, month_offset(date(2024, 1), date(2023, 12)));
        assert_eq!(-2, month_offset(date(2024, 3), date(2024, 5)));
    }

    #[test]
    fn offset_ignores_day_of_month() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let target = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(1, month_offset(today, target));
    }

    #[test]
    fn window_is_strictly_descending_without_duplicates() {
        let offsets = resolve_window(date(2024, 3), date(2023, 1), date(2024, 3));
        assert_eq!((1..=14).rev().collect::<Vec<_>>(), offsets);
        for pair in offsets.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn window_length_matches_offset_difference() {
        let today = date(2024, 3);
        let from = date(2022, 6);
        let to = date(2024, 1);
        let offsets = resolve_window(today, from, to);
        assert_eq!(
            (month_offset(today, from) - month_offset(today, to)) as usize,
            offsets.len()
        );
    }

    #[test]
    fn equal_boundaries_yield_empty_window() {
        assert!(resolve_window(date(2024, 3), date(2023, 5), date(2023, 5)).is_empty());
    }

    #[test]
    fn pending_removal_is_atomic_against_snapshot() {
        let mut pending = PendingMonths::new(vec![3, 2, 1]);
        let snapshot = pending.snapshot();
        pending.remove_all(&[2]);
        // the snapshot taken before removal is unaffected
        assert_eq!(vec![3, 2, 1], snapshot);
        assert_eq!(vec![3, 1], pending.snapshot());
        assert!(!pending.contains(2));
        assert_eq!(2, pending.len());
    }

    #[test]
    fn pending_empties_to_terminal_state() {
        let mut pending = PendingMonths::new(vec![2, 1]);
        assert!(!pending.is_empty());
        pending.remove_all(&[1, 2]);
        assert!(pending.is_empty());
    }
}
