//! Attempt bookkeeping shared by the async and blocking loops.

use std::time::Duration;

use crate::WaitOptions;

/// Where a wait currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Not done yet; another attempt will follow after the delay.
    Waiting,

    /// An attempt succeeded.
    Done,

    /// The time budget is spent.
    TimedOut,
}

impl WaitState {
    /// Returns true once the wait will make no further attempts.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

/// Decides whether another attempt may run, given the time already spent.
///
/// The loop driving a `Deadline` owns the clock; the deadline only sees
/// elapsed durations, which keeps it independent of how time is measured.
#[derive(Debug, Clone)]
pub struct Deadline {
    delay: Duration,
    timeout: Duration,
    attempts: u32,
    state: WaitState,
}

impl Deadline {
    /// Start tracking a wait.
    pub fn new(opts: &WaitOptions) -> Self {
        Self {
            delay: opts.delay,
            timeout: opts.timeout,
            attempts: 0,
            state: WaitState::Waiting,
        }
    }

    /// Ask to start an attempt at `elapsed`.
    ///
    /// The first attempt is always allowed. Later attempts are allowed while
    /// `elapsed <= timeout`, so one landing exactly on the budget still runs.
    /// Returns false (and moves to [`WaitState::TimedOut`]) otherwise.
    pub fn begin_attempt(&mut self, elapsed: Duration) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if self.attempts > 0 && elapsed > self.timeout {
            self.state = WaitState::TimedOut;
            return false;
        }
        self.attempts += 1;
        true
    }

    /// Record the outcome of the attempt that just ran.
    ///
    /// A failed attempt at or past the budget ends the wait: there is no
    /// point sleeping when no further attempt could be made.
    pub fn record(&mut self, succeeded: bool, elapsed: Duration) -> WaitState {
        self.state = if succeeded {
            WaitState::Done
        } else if elapsed >= self.timeout {
            WaitState::TimedOut
        } else {
            WaitState::Waiting
        };
        self.state
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Interval to sleep between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Current state.
    pub fn state(&self) -> WaitState {
        self.state
    }
}
