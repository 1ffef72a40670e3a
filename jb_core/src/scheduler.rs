use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Compute the next time `cron_expr` fires at or after `from`.
///
/// Fails with [`Error::JobFailure`] if the expression doesn't parse, or if
/// it has no occurrence at or after `from` at all (an expression whose
/// only matches are in the past, e.g. a year field fixed to 1900).
pub fn next_fire_after(cron_expr: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let schedule = Schedule::from_str(cron_expr)
        .map_err(|e| Error::JobFailure(format!("invalid cron expression {cron_expr:?}: {e}")))?;
    schedule
        .after(&from)
        .next()
        .ok_or_else(|| Error::JobFailure(format!("cron expression {cron_expr:?} never fires")))
}

/// Compute the `run_at` timestamp for a delayed job.
pub fn delay_from_now(delay_seconds: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(delay_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_fire_after_future_expression() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = next_fire_after("0 0 * * * * *", from).unwrap();
        assert!(next >= from);
    }

    #[test]
    fn test_next_fire_after_rejects_unparseable() {
        let from = Utc::now();
        let err = next_fire_after("not a cron expr", from).unwrap_err();
        assert!(matches!(err, Error::JobFailure(_)));
    }

    #[test]
    fn test_next_fire_after_rejects_past_only_schedule() {
        let from = Utc::now();
        let err = next_fire_after("* * * * * * 1900", from).unwrap_err();
        assert!(matches!(err, Error::JobFailure(_)));
    }

    #[test]
    fn test_delay_from_now_is_in_the_future() {
        let now = Utc::now();
        let run_at = delay_from_now(60);
        assert!(run_at > now);
    }
}
