//! Placement algorithms: one per `SchedulingStrategy`, each deciding a
//! `Schedule`'s `due` timestamp at enqueue time (spec §4.2 "Placement
//! algorithms").

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc, Weekday};

use scanforge_types::model::{Priority, SchedulingStrategy};

/// Business-hours/peak-hours/maintenance-window anchors (spec §6
/// `businessHours`/`peakHours`/`maintenanceWindow`). spec.md §9 flags
/// these as hard-coded in the source but notes "real deployments likely
/// require configuration — treat as configurable from day one"; this
/// struct is that configuration surface. Defaults match the source's own
/// literal values (09-17, 10-16, 02-04).
#[derive(Debug, Clone, Copy)]
pub struct PlacementConfig {
    pub business_start_hour: u32,
    pub business_end_hour: u32,
    pub peak_start_hour: u32,
    pub peak_end_hour: u32,
    pub maintenance_start_hour: u32,
    pub maintenance_end_hour: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            business_start_hour: 9,
            business_end_hour: 17,
            peak_start_hour: 10,
            peak_end_hour: 16,
            maintenance_start_hour: 2,
            maintenance_end_hour: 4,
        }
    }
}

fn is_weekday(now: DateTime<Utc>) -> bool {
    !matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

fn is_business_hours(config: &PlacementConfig, now: DateTime<Utc>) -> bool {
    is_weekday(now) && (config.business_start_hour..config.business_end_hour).contains(&now.hour())
}

fn at_time(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
        .and_local_timezone(Utc)
        .unwrap()
}

/// Next business day at the configured start hour, walking forward one
/// day at a time over weekends.
fn next_business_day_start(config: &PlacementConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut day = now.date_naive().succ_opt().unwrap();
    while matches!(
        Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN)).weekday(),
        Weekday::Sat | Weekday::Sun
    ) {
        day = day.succ_opt().unwrap();
    }
    day.and_time(NaiveTime::from_hms_opt(config.business_start_hour, 0, 0).unwrap())
        .and_local_timezone(Utc)
        .unwrap()
}

/// Shift `due` out of the maintenance window to its end hour the same
/// day, if it falls inside it (spec §4.2 OptimalTime fallback).
fn avoid_maintenance_window(config: &PlacementConfig, due: DateTime<Utc>) -> DateTime<Utc> {
    if (config.maintenance_start_hour..config.maintenance_end_hour).contains(&due.hour()) {
        at_time(due, config.maintenance_end_hour)
    } else {
        due
    }
}

fn heuristic_delay(config: &PlacementConfig, now: DateTime<Utc>, queue_len: usize, rule_count: usize) -> Duration {
    let mut delay = Duration::minutes(30);

    if queue_len > 20 {
        delay += Duration::hours(1);
    } else if queue_len > 10 {
        delay += Duration::minutes(30);
    }

    let hour = now.hour();
    if (config.peak_start_hour..=config.peak_end_hour).contains(&hour) {
        delay += Duration::hours(2);
    } else if !is_business_hours(config, now) {
        delay -= Duration::minutes(30);
    }

    if rule_count > 20 {
        delay += Duration::hours(1);
    } else if rule_count < 5 {
        delay -= Duration::minutes(15);
    }

    delay
}

fn clamp_optimal_time_delay(priority: Priority, delay: Duration) -> Duration {
    let floor = Duration::minutes(5);
    let delay = delay.max(floor);
    match priority {
        Priority::Critical => delay.min(Duration::hours(2)),
        Priority::Background => delay.max(Duration::hours(4)),
        _ => delay,
    }
}

/// Input for [`ResourceBased`](SchedulingStrategy::ResourceBased)'s
/// 24-hour lookahead: a cheap predictor of how suitable a future hour
/// looks for admission. Backed by the caller (typically the resource
/// pool's historical utilization), not specified further by spec.md.
pub trait ResourceForecast {
    /// Suitability score (higher is better) for admitting at `candidate`.
    fn score(&self, candidate: DateTime<Utc>) -> f64;
}

/// Compute `due` for `strategy` given the current time, queue depth, and
/// request shape (spec §4.2). `forecast` is consulted only by
/// `ResourceBased`.
pub fn compute_due(
    config: &PlacementConfig,
    strategy: SchedulingStrategy,
    priority: Priority,
    now: DateTime<Utc>,
    queue_len: usize,
    rule_count: usize,
    forecast: &dyn ResourceForecast,
) -> DateTime<Utc> {
    match strategy {
        SchedulingStrategy::Immediate => now,

        SchedulingStrategy::BusinessHours => {
            if is_business_hours(config, now) {
                let delay = if matches!(priority, Priority::Critical | Priority::High) {
                    Duration::minutes(15)
                } else {
                    Duration::hours(1)
                };
                now + delay
            } else {
                next_business_day_start(config, now)
            }
        }

        SchedulingStrategy::OffPeak => {
            if !is_business_hours(config, now) {
                now + Duration::minutes(30)
            } else {
                at_time(now, config.business_end_hour)
            }
        }

        SchedulingStrategy::ResourceBased => {
            let best = (0..24)
                .map(|step| now + Duration::hours(step))
                .max_by(|a, b| {
                    let score_a = score_with_off_peak_bonus(config, forecast, *a);
                    let score_b = score_with_off_peak_bonus(config, forecast, *b);
                    score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(now);
            best
        }

        SchedulingStrategy::OptimalTime | SchedulingStrategy::Predictive | SchedulingStrategy::Adaptive => {
            let delay = heuristic_delay(config, now, queue_len, rule_count);
            let delay = clamp_optimal_time_delay(priority, delay);
            avoid_maintenance_window(config, now + delay)
        }

        SchedulingStrategy::DependencyAware => now,
    }
}

fn score_with_off_peak_bonus(config: &PlacementConfig, forecast: &dyn ResourceForecast, candidate: DateTime<Utc>) -> f64 {
    let base = forecast.score(candidate);
    if !is_business_hours(config, candidate) {
        base + 20.0
    } else {
        base
    }
}
