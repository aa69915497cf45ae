//! The recurring-schedule evaluator.
//!
//! `evaluate_next_run` is a pure, deterministic function: given a rule and a
//! reference instant it returns the smallest instant strictly greater than
//! the reference that satisfies the rule, or `None` once the horizon
//! (`max_runs`/`run_until`) is exhausted. It performs no I/O and is safe to
//! call concurrently — callers (the scheduler, the worker pool) own all
//! mutable state (`current_run_count`).

mod interval;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use interval::IntervalKind;

/// How many times the skip-past loop below will recompute a
/// candidate before giving up. A well-formed rule never approaches this;
/// it exists so a pathological rule (e.g. an interval of zero) fails loud
/// instead of looping forever.
const MAX_SKIP_ITERATIONS: u32 = 100_000;

/// A declarative recurring schedule: exactly one interval kind plus
/// optional first-run and horizon modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringRule {
    pub interval: IntervalKind,
    /// Run immediately on registration, before the first interval-computed
    /// instant.
    pub run_now: bool,
    /// First run occurs `initial_delay` after registration instead of at
    /// the next interval-aligned instant.
    pub initial_delay: Option<chrono::Duration>,
    /// First run occurs at this absolute instant.
    pub specific_run_time: Option<DateTime<Utc>>,
    pub max_runs: Option<u32>,
    pub run_until: Option<DateTime<Utc>>,
}

impl RecurringRule {
    pub fn new(interval: IntervalKind) -> Self {
        Self {
            interval,
            run_now: false,
            initial_delay: None,
            specific_run_time: None,
            max_runs: None,
            run_until: None,
        }
    }

    pub fn with_max_runs(mut self, max_runs: u32) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    pub fn with_run_until(mut self, run_until: DateTime<Utc>) -> Self {
        self.run_until = Some(run_until);
        self
    }

    pub fn with_run_now(mut self) -> Self {
        self.run_now = true;
        self
    }

    pub fn with_initial_delay(mut self, delay: chrono::Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn with_specific_run_time(mut self, at: DateTime<Utc>) -> Self {
        self.specific_run_time = Some(at);
        self
    }

    fn has_first_run_modifier(&self) -> bool {
        self.run_now || self.initial_delay.is_some() || self.specific_run_time.is_some()
    }

    /// The instant the first-run modifiers impose, independent of the
    /// interval kind.
    fn first_run_instant(&self, scheduled_time: DateTime<Utc>, reference_time: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(at) = self.specific_run_time {
            return at;
        }
        if let Some(delay) = self.initial_delay {
            return scheduled_time + delay;
        }
        // run_now: fire as close to "now" as the caller's reference instant.
        reference_time
    }
}

/// Result of evaluating a rule against a reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextRun {
    pub next_run: Option<DateTime<Utc>>,
    pub skipped_count: u32,
}

impl NextRun {
    fn none() -> Self {
        Self {
            next_run: None,
            skipped_count: 0,
        }
    }
}

/// The smallest instant strictly greater than `reference_time` that
/// satisfies `rule`, given how many
/// times the schedule has already fired (`current_run_count`).
///
/// `scheduled_time` is the instant the rule was registered against (used to
/// anchor `initial_delay` and as the lower bound for cron evaluation).
pub fn evaluate_next_run(
    rule: &RecurringRule,
    scheduled_time: DateTime<Utc>,
    current_run_count: u32,
    reference_time: DateTime<Utc>,
) -> NextRun {
    // Step 1: max_runs exhaustion.
    if let Some(max_runs) = rule.max_runs {
        if current_run_count >= max_runs {
            return NextRun::none();
        }
    }

    // Step 2: run_until exhaustion.
    if let Some(run_until) = rule.run_until {
        if reference_time >= run_until {
            return NextRun::none();
        }
    }

    // Step 3: the interval-computed candidate.
    let mut candidate = match interval::candidate_instant(&rule.interval, scheduled_time, reference_time) {
        Some(instant) => instant,
        None => return NextRun::none(),
    };

    // Step 4: first-run substitution.
    if current_run_count == 0 && rule.has_first_run_modifier() {
        candidate = rule.first_run_instant(scheduled_time, reference_time);
    }

    // Step 5: skip-past loop.
    let mut skipped_count = 0;
    let mut reference = reference_time;
    while candidate <= reference_time {
        skipped_count += 1;
        if skipped_count > MAX_SKIP_ITERATIONS {
            return NextRun::none();
        }
        reference = candidate;
        candidate = match interval::candidate_instant(&rule.interval, scheduled_time, reference) {
            Some(instant) => instant,
            None => return NextRun::none(),
        };
    }

    // Step 6: run_until upper bound on the chosen instant.
    if let Some(run_until) = rule.run_until {
        if candidate > run_until {
            return NextRun::none();
        }
    }

    NextRun {
        next_run: Some(candidate),
        skipped_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn monotonicity_second_interval() {
        let rule = RecurringRule::new(IntervalKind::SecondInterval(30));
        let reference = utc(2026, 1, 1, 0, 0, 5);
        let result = evaluate_next_run(&rule, reference, 0, reference);
        let next = result.next_run.unwrap();
        assert!(next > reference);
    }

    #[test]
    fn max_runs_exhaustion() {
        let rule = RecurringRule::new(IntervalKind::SecondInterval(10)).with_max_runs(2);
        let reference = utc(2026, 1, 1, 0, 0, 0);
        let result = evaluate_next_run(&rule, reference, 2, reference);
        assert_eq!(result.next_run, None);
    }

    #[test]
    fn run_until_exhaustion() {
        let run_until = utc(2026, 1, 1, 0, 0, 30);
        let rule = RecurringRule::new(IntervalKind::SecondInterval(10)).with_run_until(run_until);
        let reference = utc(2026, 1, 1, 0, 0, 30);
        let result = evaluate_next_run(&rule, reference, 0, reference);
        assert_eq!(result.next_run, None);
    }

    #[test]
    fn run_until_caps_candidate() {
        let run_until = utc(2026, 1, 1, 0, 0, 15);
        let rule = RecurringRule::new(IntervalKind::SecondInterval(10)).with_run_until(run_until);
        let reference = utc(2026, 1, 1, 0, 0, 0);
        // Next multiple of 10s after 0 is 10s, which is <= run_until (15s): allowed.
        let result = evaluate_next_run(&rule, reference, 0, reference);
        assert_eq!(result.next_run, Some(utc(2026, 1, 1, 0, 0, 10)));
        // From a reference of 10s, the next candidate (20s) exceeds run_until.
        let result2 = evaluate_next_run(&rule, reference, 1, utc(2026, 1, 1, 0, 0, 10));
        assert_eq!(result2.next_run, None);
    }

    #[test]
    fn specific_run_time_in_past_is_bumped_forward_by_skip_loop() {
        let scheduled = utc(2026, 1, 1, 0, 0, 0);
        let past = utc(2025, 1, 1, 0, 0, 0);
        let rule = RecurringRule::new(IntervalKind::MinuteInterval { n: 5, on_second: None })
            .with_specific_run_time(past);
        let reference = utc(2026, 1, 1, 0, 3, 0);
        let result = evaluate_next_run(&rule, scheduled, 0, reference);
        assert!(result.next_run.unwrap() > reference);
        assert!(result.skipped_count > 0);
    }

    #[test]
    fn month_interval_day31_clamps_short_months() {
        let rule = RecurringRule::new(IntervalKind::MonthInterval {
            n: 1,
            on_day: Some(31),
            on_first_day_of_week: None,
            on_times: vec![chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap()],
            on_months: vec![],
        });
        let reference = utc(2026, 2, 1, 0, 0, 0);
        let result = evaluate_next_run(&rule, reference, 0, reference);
        let next = result.next_run.unwrap();
        assert_eq!(next.date_naive().day(), 28); // 2026 is not a leap year
        assert_eq!(next.month(), 2);
    }

    #[test]
    fn cron_every_ten_seconds() {
        let rule = RecurringRule::new(IntervalKind::Cron("*/10 * * * * *".to_string()));
        let reference = utc(2026, 1, 1, 0, 0, 3);
        let result = evaluate_next_run(&rule, reference, 0, reference);
        assert_eq!(result.next_run, Some(utc(2026, 1, 1, 0, 0, 10)));
    }
}
