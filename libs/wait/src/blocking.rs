//! Blocking wait loops for callers without an async runtime.
//!
//! Same semantics as the async versions; the calling thread sleeps between
//! attempts. Time comes from a [`Clock`] so tests can run on a
//! [`ManualClock`] instead of the wall clock.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::poll::timed_out;
use crate::{Deadline, WaitError, WaitOptions, WaitState, Waited};

/// Source of time for blocking waits.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when slept on or advanced.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward without sleeping.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Blocking [`crate::wait_for`] on the wall clock.
pub fn wait_for<T, P>(what: &str, opts: &WaitOptions, probe: P) -> Result<Waited<T>, WaitError>
where
    P: FnMut() -> anyhow::Result<Option<T>>,
{
    poll_with_clock(&SystemClock, what, opts, probe, || Ok(()))
}

/// Blocking [`crate::wait_until`] on the wall clock.
pub fn wait_until<P, R>(
    what: &str,
    opts: &WaitOptions,
    mut predicate: P,
    refresh: R,
) -> Result<Waited<()>, WaitError>
where
    P: FnMut() -> anyhow::Result<bool>,
    R: FnMut() -> anyhow::Result<()>,
{
    poll_with_clock(
        &SystemClock,
        what,
        opts,
        || Ok(predicate()?.then_some(())),
        refresh,
    )
}

/// Blocking [`crate::poll`] on an arbitrary clock.
pub fn poll_with_clock<C, T, P, R>(
    clock: &C,
    what: &str,
    opts: &WaitOptions,
    mut probe: P,
    mut refresh: R,
) -> Result<Waited<T>, WaitError>
where
    C: Clock + ?Sized,
    P: FnMut() -> anyhow::Result<Option<T>>,
    R: FnMut() -> anyhow::Result<()>,
{
    let start = clock.now();
    let elapsed = || clock.now().saturating_duration_since(start);
    let mut deadline = Deadline::new(opts);
    let mut last_error = None;

    while deadline.begin_attempt(elapsed()) {
        let attempt = deadline.attempts();

        let found = match probe() {
            Ok(found) => found,
            Err(err) if opts.handle_errors => {
                debug!(what, attempt, error = %err, "Probe failed, treating as not ready");
                last_error = Some(format!("{err:#}"));
                None
            }
            Err(source) => {
                warn!(what, attempt, error = %source, "Probe failed, aborting wait");
                return Err(WaitError::Probe {
                    what: what.to_string(),
                    attempt,
                    source,
                });
            }
        };

        let now = elapsed();
        let state = deadline.record(found.is_some(), now);
        if let Some(value) = found {
            return Ok(Waited {
                value,
                attempts: attempt,
                elapsed: now,
            });
        }
        if state == WaitState::TimedOut {
            break;
        }

        refresh().map_err(|source| WaitError::Refresh {
            what: what.to_string(),
            attempt,
            source,
        })?;
        clock.sleep(deadline.delay());
    }

    Err(timed_out(what, opts, &deadline, elapsed(), last_error))
}
