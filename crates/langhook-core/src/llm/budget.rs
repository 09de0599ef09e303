//! Process-wide LLM spend tracking.
//!
//! Modeled as a single atomic micro-dollar counter with compare-and-swap
//! increment, rather than a mutex-guarded float, so concurrent calls never
//! lose an increment. The clock is injectable so rollover-at-UTC-midnight is
//! testable without sleeping a day.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Tracks today's estimated USD spend against a daily cap, rolling over at
/// UTC midnight.
pub struct Budget<C: Clock = SystemClock> {
    clock: C,
    daily_cap_micros: i64,
    alert_threshold: f64,
    spent_micros: AtomicI64,
    day_marker: AtomicI64,
    alerted_today: std::sync::atomic::AtomicBool,
}

/// Outcome of recording a charge against the budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChargeOutcome {
    Ok,
    /// Spend just crossed the alert threshold; caller should log a warning
    /// (only reported once per day).
    ThresholdCrossed,
    /// The daily cap is already exhausted; the call should fail with
    /// `budget-exhausted` without being recorded.
    Exhausted,
}

impl<C: Clock> Budget<C> {
    pub fn new(clock: C, daily_cap_usd: f64, alert_threshold: f64) -> Self {
        let today = clock.now().num_days_from_epoch();
        Self {
            clock,
            daily_cap_micros: usd_to_micros(daily_cap_usd),
            alert_threshold,
            spent_micros: AtomicI64::new(0),
            day_marker: AtomicI64::new(today),
            alerted_today: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn roll_over_if_needed(&self) {
        let today = self.clock.now().num_days_from_epoch();
        let last = self.day_marker.load(Ordering::Acquire);
        if today != last
            && self
                .day_marker
                .compare_exchange(last, today, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.spent_micros.store(0, Ordering::Release);
            self.alerted_today.store(false, Ordering::Release);
        }
    }

    /// Record an estimated charge of `usd`. Returns `Exhausted` without
    /// recording anything if this charge would meet or exceed the cap.
    pub fn charge(&self, usd: f64) -> ChargeOutcome {
        self.roll_over_if_needed();

        let micros = usd_to_micros(usd);
        let mut current = self.spent_micros.load(Ordering::Acquire);
        loop {
            let next = current + micros;
            if next >= self.daily_cap_micros {
                return ChargeOutcome::Exhausted;
            }
            match self.spent_micros.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let fraction = next as f64 / self.daily_cap_micros.max(1) as f64;
                    if fraction >= self.alert_threshold
                        && !self.alerted_today.swap(true, Ordering::AcqRel)
                    {
                        return ChargeOutcome::ThresholdCrossed;
                    }
                    return ChargeOutcome::Ok;
                }
                Err(observed) => current = observed,
            }
        }
    }

    pub fn spent_today_usd(&self) -> f64 {
        self.roll_over_if_needed();
        self.spent_micros.load(Ordering::Acquire) as f64 / 1_000_000.0
    }
}

fn usd_to_micros(usd: f64) -> i64 {
    (usd * 1_000_000.0).round() as i64
}

trait DayMarker {
    fn num_days_from_epoch(&self) -> i64;
}

impl DayMarker for DateTime<Utc> {
    fn num_days_from_epoch(&self) -> i64 {
        self.timestamp() / 86_400
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedClock(Mutex<DateTime<Utc>>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    impl FixedClock {
        fn at(ts: &str) -> Self {
            Self(Mutex::new(ts.parse().unwrap()))
        }

        fn advance_to(&self, ts: &str) {
            *self.0.lock().unwrap() = ts.parse().unwrap();
        }
    }

    #[test]
    fn charges_accumulate_until_cap() {
        let budget = Budget::new(FixedClock::at("2026-01-01T00:00:00Z"), 0.01, 0.8);
        assert_eq!(budget.charge(0.005), ChargeOutcome::Ok);
        assert_eq!(budget.charge(0.003), ChargeOutcome::ThresholdCrossed);
        assert_eq!(budget.charge(0.002), ChargeOutcome::Exhausted);
    }

    #[test]
    fn exhausted_budget_recovers_at_utc_rollover() {
        let budget = Budget::new(FixedClock::at("2026-01-01T23:59:59Z"), 0.01, 0.8);
        assert_eq!(budget.charge(0.02), ChargeOutcome::Exhausted);
        budget.clock.advance_to("2026-01-02T00:00:01Z");
        assert_eq!(budget.charge(0.001), ChargeOutcome::Ok);
    }

    #[test]
    fn alert_only_fires_once_per_day() {
        let budget = Budget::new(FixedClock::at("2026-01-01T00:00:00Z"), 0.01, 0.5);
        assert_eq!(budget.charge(0.006), ChargeOutcome::ThresholdCrossed);
        assert_eq!(budget.charge(0.001), ChargeOutcome::Ok);
    }
}
