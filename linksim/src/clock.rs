//! The discrete-event clock driving a link.
//!
//! All "waiting" in the impairment model is expressed as an [`Action`] scheduled at a future
//! [`SimTime`]. The [`Simulator`] executes actions strictly in timestamp order, breaking ties by
//! submission order, on a single thread. Every action carries a [`CancellationToken`]; actions
//! whose token was cancelled before their fire time are skipped.

use std::{cmp::Ordering, collections::BinaryHeap, fmt, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::time::SimTime;

/// A future callback registered against a [`Clock`].
pub type Action = Box<dyn FnOnce(&mut dyn Clock) + Send + 'static>;

/// The event clock seen by the impairment components.
pub trait Clock {
    /// The current simulated time.
    fn now(&self) -> SimTime;

    /// Registers `action` to run at `at`. Instants in the past run at [`Clock::now`].
    fn schedule_at(&mut self, at: SimTime, token: CancellationToken, action: Action);
}

/// Convenience methods on top of [`Clock`].
pub trait ClockExt: Clock {
    /// Registers `action` to run `delay` after [`Clock::now`].
    fn schedule<F>(&mut self, delay: Duration, token: CancellationToken, action: F)
    where
        F: FnOnce(&mut dyn Clock) + Send + 'static,
    {
        let at = self.now() + delay;
        self.schedule_at(at, token, Box::new(action));
    }
}

impl<C: Clock + ?Sized> ClockExt for C {}

struct Scheduled {
    at: SimTime,
    seq: u64,
    token: CancellationToken,
    action: Action,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: `BinaryHeap` is a max-heap, we pop the earliest (at, seq) first.
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single-threaded discrete-event scheduler.
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    queue: BinaryHeap<Scheduled>,
    executed: u64,
    skipped: u64,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("now", &self.now)
            .field("pending", &self.queue.len())
            .field("executed", &self.executed)
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl Simulator {
    /// An empty queue with the clock at [`SimTime::ZERO`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions waiting in the queue, cancelled ones included.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of actions that ran.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Number of actions dropped because their token was cancelled.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Fire time of the next queued action.
    pub fn next_event_at(&self) -> Option<SimTime> {
        self.queue.peek().map(|s| s.at)
    }

    /// Pops and runs the next action. Returns `false` once the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(scheduled) = self.queue.pop() else {
            return false;
        };

        self.now = scheduled.at;

        if scheduled.token.is_cancelled() {
            self.skipped += 1;
            tracing::trace!(at = %scheduled.at, seq = scheduled.seq, "skipping cancelled action");
            return true;
        }

        self.executed += 1;
        (scheduled.action)(self as &mut dyn Clock);

        true
    }

    /// Runs every action scheduled at or before `end`, then leaves the clock at `end`.
    ///
    /// Returns the number of actions executed during this call.
    pub fn run_until(&mut self, end: SimTime) -> u64 {
        let before = self.executed;

        while self.next_event_at().is_some_and(|at| at <= end) {
            self.step();
        }

        if self.now < end {
            self.now = end;
        }

        self.executed - before
    }

    /// Runs for `duration` of simulated time from [`Clock::now`].
    pub fn run_for(&mut self, duration: Duration) -> u64 {
        let end = self.now + duration;
        self.run_until(end)
    }
}

impl Clock for Simulator {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_at(&mut self, at: SimTime, token: CancellationToken, action: Action) {
        let at = if at < self.now {
            tracing::warn!(%at, now = %self.now, "action scheduled in the past, running it now");
            self.now
        } else {
            at
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled { at, seq, token, action });
    }
}
