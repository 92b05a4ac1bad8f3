// ── Failure / health tracking ──
//
// Consecutive-failure counter shared by the poller and the dispatcher's
// retry policy. Three consecutive poll failures mark the controller
// unavailable; the first success marks it available again.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

/// Consecutive failures after which the controller is reported unavailable.
pub const UNAVAILABLE_AFTER: u32 = 3;

/// Failures tolerated at the base interval before backoff starts growing.
const GRACE_FAILURES: u32 = 12;

/// Controller availability as observed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// No poll has completed yet.
    Unknown,
    Available,
    Unavailable,
}

/// `min(cap, base * max(1, failures - 12))`.
///
/// Constant for the first twelve failures, then grows linearly.
pub fn backoff(failures: u32, base: Duration, cap: Duration) -> Duration {
    let factor = failures.saturating_sub(GRACE_FAILURES).max(1);
    base.saturating_mul(factor).min(cap)
}

/// What the engine should do after a failed poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub failures: u32,
    pub retry_in: Duration,
    /// `true` only on the transition into `Unavailable`.
    pub became_unavailable: bool,
}

/// Tracks consecutive poll failures and publishes availability.
#[derive(Debug)]
pub struct HealthTracker {
    failures: u32,
    error_interval: Duration,
    max_backoff: Duration,
    availability: watch::Sender<Availability>,
}

impl HealthTracker {
    pub fn new(error_interval: Duration, max_backoff: Duration) -> Self {
        let (availability, _) = watch::channel(Availability::Unknown);
        Self {
            failures: 0,
            error_interval,
            max_backoff,
            availability,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn availability(&self) -> Availability {
        *self.availability.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Availability> {
        self.availability.subscribe()
    }

    /// Reset the counter. Returns `true` if this changed availability.
    pub fn record_success(&mut self) -> bool {
        self.failures = 0;
        self.publish(Availability::Available)
    }

    /// Count one failure and compute the retry delay.
    pub fn record_failure(&mut self) -> FailureOutcome {
        self.failures = self.failures.saturating_add(1);
        let became_unavailable =
            self.failures >= UNAVAILABLE_AFTER && self.publish(Availability::Unavailable);
        FailureOutcome {
            failures: self.failures,
            retry_in: backoff(self.failures, self.error_interval, self.max_backoff),
            became_unavailable,
        }
    }

    /// Mark unavailable without counting a failure (push channel went offline).
    pub fn force_unavailable(&mut self) -> bool {
        self.publish(Availability::Unavailable)
    }

    fn publish(&self, next: Availability) -> bool {
        self.availability.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(5);
    const CAP: Duration = Duration::from_secs(120);

    #[test]
    fn backoff_constant_through_twelve_failures() {
        for n in 0..=13 {
            assert_eq!(backoff(n, BASE, CAP), BASE, "n = {n}");
        }
        assert_eq!(backoff(14, BASE, CAP), Duration::from_secs(10));
        assert_eq!(backoff(16, BASE, CAP), Duration::from_secs(20));
    }

    #[test]
    fn backoff_is_non_decreasing_and_capped() {
        let mut previous = Duration::ZERO;
        for n in 0..200 {
            let d = backoff(n, BASE, CAP);
            assert!(d >= previous);
            assert!(d <= CAP);
            previous = d;
        }
        assert_eq!(backoff(1000, BASE, CAP), CAP);
    }

    #[test]
    fn command_retry_cap_applies() {
        let cap = Duration::from_secs(2);
        assert_eq!(backoff(1, BASE, cap), cap);
    }

    #[test]
    fn unavailable_after_three_failures() {
        let mut health = HealthTracker::new(BASE, CAP);
        assert_eq!(health.availability(), Availability::Unknown);

        assert!(!health.record_failure().became_unavailable);
        assert!(!health.record_failure().became_unavailable);
        let third = health.record_failure();
        assert!(third.became_unavailable);
        assert_eq!(health.availability(), Availability::Unavailable);

        let fourth = health.record_failure();
        assert!(!fourth.became_unavailable);
        assert_eq!(fourth.failures, 4);
        assert!(fourth.retry_in >= third.retry_in);
        assert_eq!(health.availability(), Availability::Unavailable);
    }

    #[test]
    fn success_resets_and_restores() {
        let mut health = HealthTracker::new(BASE, CAP);
        for _ in 0..5 {
            health.record_failure();
        }
        assert!(health.record_success());
        assert_eq!(health.failures(), 0);
        assert_eq!(health.availability(), Availability::Available);
        assert!(!health.record_success());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let mut health = HealthTracker::new(BASE, CAP);
        let mut rx = health.subscribe();
        health.record_success();
        rx.changed().await.ok();
        assert_eq!(*rx.borrow(), Availability::Available);
    }
}
