//! Bounded polling primitives.
//!
//! Records created by an external system (a provider sync, an analysis task)
//! show up in the observed store some time after the triggering call. This
//! library provides the two waits used to observe them:
//!
//! - **Existence polling** ([`wait_for`]): call a probe on a fixed interval
//!   until it yields a value or the time budget is spent.
//! - **Condition wait with recovery** ([`wait_until`]): call a predicate and,
//!   after every failed attempt, a refresh action that brings a cached view
//!   up to date.
//!
//! Both are thin loops over [`Deadline`], and both exist in an async flavour
//! (driven by `tokio::time`) and a [`blocking`] flavour (driven by a
//! [`blocking::Clock`]).
//!
//! # Invariants
//!
//! - The interval is constant; there is no backoff.
//! - The first attempt happens immediately.
//! - An attempt that lands exactly on the time budget is still made.
//! - Probe and refresh errors abort the wait, unless the caller asked for
//!   probe errors to be handled as failed attempts.

mod deadline;
mod error;
mod options;
mod poll;

pub mod blocking;

pub use deadline::{Deadline, WaitState};
pub use error::WaitError;
pub use options::{parse_duration, WaitOptions, DEFAULT_DELAY, DEFAULT_TIMEOUT, MIN_DELAY};
pub use poll::{poll, wait_for, wait_until};

use std::time::Duration;

/// Result of a successful wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waited<T> {
    /// The value produced by the successful attempt.
    pub value: T,

    /// Number of attempts made, including the successful one.
    pub attempts: u32,

    /// Time elapsed from the first attempt until success.
    pub elapsed: Duration,
}

impl<T> Waited<T> {
    /// Discard the bookkeeping and keep the value.
    pub fn into_value(self) -> T {
        self.value
    }
}
