use chrono::{DateTime, Utc};
use jb_core::Priority;

/// Component shared by both board realizations: priority is folded into
/// the sort key so that the default iteration order is
/// (priority, created_on) without a secondary sort pass.
///
/// The sqlite board uses this as an `ORDER BY` column; the redis board
/// uses it as a sorted-set score. `TIMESTAMP_SPAN` is chosen so that a
/// full priority rank (0..=2) always outranks any timestamp delta within
/// it — i.e. every HIGH-priority job sorts before every NORMAL one,
/// regardless of arrival order.
const TIMESTAMP_SPAN: i64 = 10_000_000_000_000; // comfortably past year 5138 in millis

pub fn sort_key(priority: Priority, created_on: DateTime<Utc>) -> i64 {
    (priority.rank() as i64) * TIMESTAMP_SPAN + created_on.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_high_priority_always_sorts_before_normal() {
        let early = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let high_late = sort_key(Priority::High, late);
        let normal_early = sort_key(Priority::Normal, early);
        assert!(high_late < normal_early);
    }

    #[test]
    fn test_same_priority_orders_by_created_on() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(sort_key(Priority::Normal, earlier) < sort_key(Priority::Normal, later));
    }
}
