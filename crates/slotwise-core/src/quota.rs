//! Weekly rolling consumption allowance.
//!
//! A weekly budget is released in equal slices, one per interval (a day by
//! default), and shared evenly between targets. What a target is owed is
//! the released amount minus what the chain says it already consumed.

use serde::Serialize;

use crate::error::{Result, SlotError};

pub const DAY_SECONDS: u64 = 86_400;
pub const WEEK_SECONDS: u64 = 7 * DAY_SECONDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCalculator {
    week_seconds: u64,
    interval_seconds: u64,
}

impl Default for QuotaCalculator {
    fn default() -> Self {
        Self {
            week_seconds: WEEK_SECONDS,
            interval_seconds: DAY_SECONDS,
        }
    }
}

impl QuotaCalculator {
    pub fn new(week_seconds: u64, interval_seconds: u64) -> Result<Self> {
        if week_seconds == 0 || interval_seconds == 0 {
            return Err(SlotError::InvalidConfig(
                "quota week and interval must be positive".into(),
            ));
        }
        if interval_seconds > week_seconds {
            return Err(SlotError::InvalidConfig(format!(
                "quota interval ({interval_seconds}s) is longer than the week ({week_seconds}s)"
            )));
        }
        Ok(Self {
            week_seconds,
            interval_seconds,
        })
    }

    pub fn week_seconds(&self) -> u64 {
        self.week_seconds
    }

    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds
    }

    pub fn week_start(&self, now: u64) -> u64 {
        now / self.week_seconds * self.week_seconds
    }

    pub fn intervals_per_week(&self) -> u64 {
        self.week_seconds / self.interval_seconds
    }

    /// Intervals released so far this week, counting the current one.
    pub fn intervals_elapsed(&self, now: u64) -> u64 {
        (now - self.week_start(now)) / self.interval_seconds + 1
    }

    /// Budget released to one of `n_targets` targets as of `now`.
    pub fn expected_quota(&self, now: u64, budget: f64, n_targets: usize) -> f64 {
        if n_targets == 0 {
            return 0.0;
        }
        let released = self.intervals_elapsed(now).min(self.intervals_per_week());
        released as f64 * budget / self.intervals_per_week() as f64 / n_targets as f64
    }

    /// Start of the interval after the one containing `now`, never past the
    /// end of the week.
    pub fn next_interval_start(&self, now: u64) -> u64 {
        let week_start = self.week_start(now);
        let next = week_start + self.intervals_elapsed(now) * self.interval_seconds;
        next.min(week_start + self.week_seconds)
    }

    /// Full quota picture for one target.
    pub fn assess(
        &self,
        now: u64,
        budget: f64,
        n_targets: usize,
        consumed: f64,
        price: f64,
    ) -> TargetQuota {
        let expected = self.expected_quota(now, budget, n_targets);
        let short = shortfall(expected, consumed);
        TargetQuota {
            expected,
            consumed,
            shortfall: short,
            units: units_to_buy(short, price),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetQuota {
    pub expected: f64,
    pub consumed: f64,
    pub shortfall: f64,
    pub units: u64,
}

pub fn shortfall(expected: f64, consumed: f64) -> f64 {
    (expected - consumed).max(0.0)
}

/// Purchases needed to cover `shortfall` at `price` per unit.
///
/// Non-positive shortfalls and prices buy nothing.
pub fn units_to_buy(shortfall: f64, price: f64) -> u64 {
    if shortfall <= 0.0 || price <= 0.0 || !price.is_finite() {
        return 0;
    }
    (shortfall / price).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_release_of_weekly_budget() {
        let q = QuotaCalculator::default();
        assert_eq!(q.expected_quota(WEEK_SECONDS, 140.0, 1), 20.0);
        assert_eq!(q.expected_quota(WEEK_SECONDS + DAY_SECONDS, 140.0, 1), 40.0);
        assert_eq!(q.expected_quota(2 * WEEK_SECONDS - 1, 140.0, 1), 140.0);
    }

    #[test]
    fn quota_resets_at_week_boundary() {
        let q = QuotaCalculator::default();
        assert_eq!(q.expected_quota(2 * WEEK_SECONDS, 140.0, 1), 20.0);
    }

    #[test]
    fn quota_increases_within_week() {
        let q = QuotaCalculator::default();
        let mut last = 0.0;
        for day in 0..7 {
            let now = WEEK_SECONDS + day * DAY_SECONDS + 10;
            let e = q.expected_quota(now, 140.0, 1);
            assert!(e > last);
            last = e;
        }
    }

    #[test]
    fn quota_is_shared_between_targets() {
        let q = QuotaCalculator::default();
        assert_eq!(q.expected_quota(WEEK_SECONDS, 140.0, 4), 5.0);
        assert_eq!(q.expected_quota(WEEK_SECONDS, 140.0, 0), 0.0);
    }

    #[test]
    fn hourly_intervals() {
        let q = QuotaCalculator::new(WEEK_SECONDS, 3_600).unwrap();
        assert_eq!(q.intervals_per_week(), 168);
        assert_eq!(q.expected_quota(WEEK_SECONDS + 3_600, 168.0, 1), 2.0);
    }

    #[test]
    fn next_interval_start_is_next_day() {
        let q = QuotaCalculator::default();
        assert_eq!(q.next_interval_start(WEEK_SECONDS + 5), WEEK_SECONDS + DAY_SECONDS);
        assert_eq!(q.next_interval_start(2 * WEEK_SECONDS - 1), 2 * WEEK_SECONDS);
    }

    #[test]
    fn shortfall_never_negative() {
        assert_eq!(shortfall(20.0, 25.0), 0.0);
        assert_eq!(shortfall(20.0, 5.0), 15.0);
    }

    #[test]
    fn units_round_up() {
        assert_eq!(units_to_buy(15.0, 2.0), 8);
        assert_eq!(units_to_buy(16.0, 2.0), 8);
        assert_eq!(units_to_buy(0.0, 2.0), 0);
        assert_eq!(units_to_buy(5.0, 0.0), 0);
    }

    #[test]
    fn assess_combines_steps() {
        let q = QuotaCalculator::default();
        let t = q.assess(WEEK_SECONDS + DAY_SECONDS, 140.0, 1, 25.0, 3.0);
        assert_eq!(t.expected, 40.0);
        assert_eq!(t.shortfall, 15.0);
        assert_eq!(t.units, 5);
    }

    #[test]
    fn rejects_bad_intervals() {
        assert!(QuotaCalculator::new(WEEK_SECONDS, 0).is_err());
        assert!(QuotaCalculator::new(DAY_SECONDS, WEEK_SECONDS).is_err());
    }
}
