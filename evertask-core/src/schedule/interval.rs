//! Candidate-instant computation for each `IntervalKind`.
//!
//! Each numeric-interval variant is computed the same way: align the
//! reference instant forward to the next multiple of the interval (anchored
//! at the rule's `scheduled_time`), then, if the rule names `onTimes`/
//! `onDays`/`onMonths` filters, search forward for the least instant that
//! satisfies every filter simultaneously (a conjunction, never a union).

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One interval kind per `RecurringRule`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntervalKind {
    /// 5- or 6-field POSIX-style cron expression.
    Cron(String),
    SecondInterval(u32),
    MinuteInterval {
        n: u32,
        on_second: Option<u32>,
    },
    HourInterval {
        n: u32,
        on_minute: Option<u32>,
        on_second: Option<u32>,
    },
    DayInterval {
        n: u32,
        on_times: Vec<NaiveTime>,
        on_days_of_week: Vec<Weekday>,
    },
    WeekInterval {
        n: u32,
        on_days: Vec<Weekday>,
        on_times: Vec<NaiveTime>,
    },
    MonthInterval {
        n: u32,
        on_day: Option<u32>,
        on_first_day_of_week: Option<Weekday>,
        on_times: Vec<NaiveTime>,
        on_months: Vec<u32>,
    },
}

/// Bound on how many days/weeks/months a search loop will walk forward
/// before concluding the rule can never be satisfied. Generous enough to
/// cover any realistic `onMonths`/`onDaysOfWeek` combination.
const MAX_DAY_SEARCH: i64 = 4000;
const MAX_MONTH_SEARCH: i64 = 600;

pub fn candidate_instant(
    kind: &IntervalKind,
    scheduled_time: DateTime<Utc>,
    reference_time: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match kind {
        IntervalKind::Cron(expr) => cron_next(expr, scheduled_time.max(reference_time)),
        IntervalKind::SecondInterval(n) => Some(align_up_seconds(*n, reference_time)),
        IntervalKind::MinuteInterval { n, on_second } => {
            Some(align_up_minutes(*n, *on_second, reference_time))
        }
        IntervalKind::HourInterval { n, on_minute, on_second } => {
            Some(align_up_hours(*n, *on_minute, *on_second, reference_time))
        }
        IntervalKind::DayInterval { n, on_times, on_days_of_week } => {
            next_day_candidate(*n, scheduled_time, on_times, on_days_of_week, reference_time)
        }
        IntervalKind::WeekInterval { n, on_days, on_times } => {
            next_week_candidate(*n, scheduled_time, on_days, on_times, reference_time)
        }
        IntervalKind::MonthInterval {
            n,
            on_day,
            on_first_day_of_week,
            on_times,
            on_months,
        } => next_month_candidate(
            *n,
            scheduled_time,
            *on_day,
            *on_first_day_of_week,
            on_times,
            on_months,
            reference_time,
        ),
    }
}

/// Normalizes a 5-field POSIX expression to the 6-field (seconds-leading)
/// form the `cron` crate requires, then finds the smallest instant after
/// `after`.
fn cron_next(expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let field_count = expr.split_whitespace().count();
    let normalized = if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    let schedule = cron::Schedule::from_str(&normalized).ok()?;
    schedule.after(&after).next()
}

fn align_up_seconds(n: u32, reference: DateTime<Utc>) -> DateTime<Utc> {
    let n = n.max(1) as i64;
    let secs = reference.timestamp();
    let next = (secs.div_euclid(n) + 1) * n;
    Utc.timestamp_opt(next, 0).single().unwrap_or(reference)
}

fn align_up_minutes(n: u32, on_second: Option<u32>, reference: DateTime<Utc>) -> DateTime<Utc> {
    let n = n.max(1) as i64;
    let minute_bucket = reference.timestamp().div_euclid(60);
    let next_minute = (minute_bucket.div_euclid(n) + 1) * n;
    let base = Utc.timestamp_opt(next_minute * 60, 0).single().unwrap_or(reference);
    base + ChronoDuration::seconds(on_second.unwrap_or(0) as i64)
}

fn align_up_hours(n: u32, on_minute: Option<u32>, on_second: Option<u32>, reference: DateTime<Utc>) -> DateTime<Utc> {
    let n = n.max(1) as i64;
    let hour_bucket = reference.timestamp().div_euclid(3600);
    let next_hour = (hour_bucket.div_euclid(n) + 1) * n;
    let base = Utc.timestamp_opt(next_hour * 3600, 0).single().unwrap_or(reference);
    base + ChronoDuration::minutes(on_minute.unwrap_or(0) as i64) + ChronoDuration::seconds(on_second.unwrap_or(0) as i64)
}

/// Produces the smallest `day + time` candidate strictly after `reference`,
/// for days matching `day_matches`. `times`, when empty, defaults to
/// midnight so a bare day-interval rule still has a candidate.
fn earliest_time_on_or_after(
    day: chrono::NaiveDate,
    times: &[NaiveTime],
    reference: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let times: Vec<NaiveTime> = if times.is_empty() {
        vec![NaiveTime::from_hms_opt(0, 0, 0).unwrap()]
    } else {
        let mut t = times.to_vec();
        t.sort();
        t
    };
    times
        .into_iter()
        .filter_map(|t| {
            let dt = Utc.from_utc_datetime(&day.and_time(t));
            if dt > reference {
                Some(dt)
            } else {
                None
            }
        })
        .min()
}

fn next_day_candidate(
    n: u32,
    scheduled_time: DateTime<Utc>,
    on_times: &[NaiveTime],
    on_days_of_week: &[Weekday],
    reference_time: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let n = n.max(1) as i64;
    let anchor = scheduled_time.date_naive();
    let start = reference_time.date_naive();
    for offset in 0..=MAX_DAY_SEARCH {
        let day = start + ChronoDuration::days(offset);
        let days_since_anchor = (day - anchor).num_days();
        if days_since_anchor < 0 || days_since_anchor % n != 0 {
            continue;
        }
        if !on_days_of_week.is_empty() && !on_days_of_week.contains(&day.weekday()) {
            continue;
        }
        if let Some(candidate) = earliest_time_on_or_after(day, on_times, reference_time) {
            return Some(candidate);
        }
    }
    None
}

fn next_week_candidate(
    n: u32,
    scheduled_time: DateTime<Utc>,
    on_days: &[Weekday],
    on_times: &[NaiveTime],
    reference_time: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let n = n.max(1) as i64;
    let anchor_week_start = iso_week_start(scheduled_time.date_naive());
    let start = reference_time.date_naive();
    for offset in 0..=MAX_DAY_SEARCH {
        let day = start + ChronoDuration::days(offset);
        let week_start = iso_week_start(day);
        let weeks_since_anchor = (week_start - anchor_week_start).num_days() / 7;
        if weeks_since_anchor < 0 || weeks_since_anchor % n != 0 {
            continue;
        }
        if !on_days.is_empty() && !on_days.contains(&day.weekday()) {
            continue;
        }
        if let Some(candidate) = earliest_time_on_or_after(day, on_times, reference_time) {
            return Some(candidate);
        }
    }
    None
}

fn iso_week_start(day: chrono::NaiveDate) -> chrono::NaiveDate {
    day - ChronoDuration::days(day.weekday().num_days_from_monday() as i64)
}

fn next_month_candidate(
    n: u32,
    scheduled_time: DateTime<Utc>,
    on_day: Option<u32>,
    on_first_day_of_week: Option<Weekday>,
    on_times: &[NaiveTime],
    on_months: &[u32],
    reference_time: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let n = n.max(1) as i64;
    let anchor_month_index = scheduled_time.year() as i64 * 12 + scheduled_time.month0() as i64;
    let start_month_index = reference_time.year() as i64 * 12 + reference_time.month0() as i64;

    for offset in 0..=MAX_MONTH_SEARCH {
        let month_index = start_month_index + offset;
        if (month_index - anchor_month_index) % n != 0 {
            continue;
        }
        let year = (month_index.div_euclid(12)) as i32;
        let month = (month_index.rem_euclid(12)) as u32 + 1;
        if !on_months.is_empty() && !on_months.contains(&month) {
            continue;
        }
        let day = match resolve_month_day(year, month, on_day, on_first_day_of_week) {
            Some(d) => d,
            None => continue,
        };
        if let Some(candidate) = earliest_time_on_or_after(day, on_times, reference_time) {
            return Some(candidate);
        }
    }
    None
}

/// Resolves the day-of-month for a `MonthInterval` occurrence. `on_day = 31`
/// in a short month clamps to that month's last day.
fn resolve_month_day(
    year: i32,
    month: u32,
    on_day: Option<u32>,
    on_first_day_of_week: Option<Weekday>,
) -> Option<chrono::NaiveDate> {
    if let Some(weekday) = on_first_day_of_week {
        let first_of_month = chrono::NaiveDate::from_ymd_opt(year, month, 1)?;
        let offset = (weekday.num_days_from_monday() + 7 - first_of_month.weekday().num_days_from_monday()) % 7;
        return Some(first_of_month + ChronoDuration::days(offset as i64));
    }
    let day = on_day.unwrap_or(1);
    let last_day = last_day_of_month(year, month);
    chrono::NaiveDate::from_ymd_opt(year, month, day.min(last_day))
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid next-month anchor");
    (next_month_first - ChronoDuration::days(1)).day()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn short_month_clamping_all_cases() {
        for (month, expected_day) in [(2, 28), (4, 30), (6, 30), (9, 30), (11, 30)] {
            assert_eq!(last_day_of_month(2026, month), expected_day, "month {month}");
        }
        assert_eq!(last_day_of_month(2024, 2), 29); // leap year
    }

    #[test]
    fn day_interval_conjunction_of_time_and_weekday() {
        let scheduled = utc(2026, 1, 1, 0, 0, 0);
        let candidate = next_day_candidate(
            1,
            scheduled,
            &[NaiveTime::from_hms_opt(8, 0, 0).unwrap()],
            &[Weekday::Mon],
            utc(2026, 1, 1, 0, 0, 0),
        )
        .unwrap();
        assert_eq!(candidate.weekday(), Weekday::Mon);
        assert_eq!(candidate.hour(), 8);
    }

    #[test]
    fn cron_five_field_is_normalized() {
        let next = cron_next("*/30 * * * *", utc(2026, 1, 1, 0, 10, 0)).unwrap();
        assert_eq!(next, utc(2026, 1, 1, 0, 30, 0));
    }
}
