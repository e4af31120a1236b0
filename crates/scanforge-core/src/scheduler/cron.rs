//! `nextCronFire`: the next fire time after `after` for a cron
//! expression (spec §4.2 "Recurrence"), backed by the `cron` crate the
//! same way the teacher's workspace already depended on it for its own
//! recurring-plan support.

use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Parse `expression` and return the first fire time strictly after
/// `after`. Returns `None` for an unparseable expression or one with no
/// future occurrence (spec §8: "the sequence of `due` values is
/// monotonically increasing and equals `nextCronFire(C, previous_due)`").
///
/// Accepts the standard 5-field form spec.md itself uses (`*/15 * * * *`)
/// by prepending a `0` seconds field before handing the expression to the
/// `cron` crate, which only parses 6-/7-field expressions.
pub fn next_cron_fire(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let normalized = normalize_expression(expression);
    let schedule = cron::Schedule::from_str(&normalized).ok()?;
    schedule.after(&after).next()
}

fn normalize_expression(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_fifteen_minutes_advances_by_a_quarter_hour() {
        let after = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let first = next_cron_fire("0 */15 * * * *", after).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2026, 7, 28, 12, 15, 0).unwrap());
        let second = next_cron_fire("0 */15 * * * *", first).unwrap();
        assert_eq!(second, Utc.with_ymd_and_hms(2026, 7, 28, 12, 30, 0).unwrap());
    }

    #[test]
    fn invalid_expression_returns_none() {
        assert!(next_cron_fire("not a cron expression", Utc::now()).is_none());
    }

    /// Spec §3/§8 write cron expressions in the standard 5-field form
    /// (`*/15 * * * *`), not the 6-field seconds-leading form the `cron`
    /// crate expects natively.
    #[test]
    fn five_field_expression_is_accepted() {
        let after = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let first = next_cron_fire("*/15 * * * *", after).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2026, 7, 28, 12, 15, 0).unwrap());
        let second = next_cron_fire("*/15 * * * *", first).unwrap();
        assert_eq!(second, Utc.with_ymd_and_hms(2026, 7, 28, 12, 30, 0).unwrap());
    }
}
