// ── Poll scheduling ──
//
// Single-flight bookkeeping for the status poll: at most one fetch is
// outstanding, forced refreshes that arrive mid-flight are queued for the
// next fetch, and periodic polling pauses while the push channel is
// healthy.

use std::time::Duration;

use tokio::time::Instant;

/// Scheduling state for one controller.
#[derive(Debug, Clone, Default)]
pub struct PollScheduler {
    in_flight: bool,
    /// Next periodic poll; `None` while push is carrying updates.
    next_due: Option<Instant>,
    /// A refresh was requested while a fetch was outstanding.
    queued: bool,
}

impl PollScheduler {
    /// A scheduler whose first poll is due immediately.
    pub fn starting_now() -> Self {
        Self {
            next_due: Some(Instant::now()),
            ..Self::default()
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Deadline the engine should sleep until, if a periodic poll is armed.
    pub fn armed_deadline(&self) -> Option<Instant> {
        if self.in_flight { None } else { self.next_due }
    }

    /// Try to begin a fetch. Returns `false` if one is already outstanding.
    pub fn begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        self.next_due = None;
        true
    }

    /// Request an out-of-band poll. Returns `true` if the caller should
    /// start it now; otherwise it runs when the current fetch completes.
    pub fn request_refresh(&mut self) -> bool {
        if self.in_flight {
            self.queued = true;
            false
        } else {
            true
        }
    }

    /// A fetch succeeded. Schedules the next periodic poll unless push is
    /// healthy. Returns `true` if a queued refresh should start now.
    pub fn succeeded(&mut self, now: Instant, interval: Duration, push_healthy: bool) -> bool {
        self.in_flight = false;
        self.next_due = if push_healthy {
            None
        } else {
            Some(now + interval)
        };
        std::mem::take(&mut self.queued)
    }

    /// A fetch failed. Returns `true` if a queued refresh should start now.
    pub fn failed(&mut self, now: Instant, retry_in: Duration) -> bool {
        self.in_flight = false;
        self.next_due = Some(now + retry_in);
        std::mem::take(&mut self.queued)
    }

    /// Push became healthy: stop periodic polling.
    pub fn suspend(&mut self) {
        self.next_due = None;
    }

    /// Push was lost: fall back to the periodic cadence if nothing is armed.
    pub fn resume(&mut self, now: Instant, interval: Duration) {
        if !self.in_flight && self.next_due.is_none() {
            self.next_due = Some(now + interval);
        }
    }
}
