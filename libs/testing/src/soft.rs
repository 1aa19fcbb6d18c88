//! Soft assertions.

use std::fmt::Debug;

use thiserror::Error;
use tracing::warn;

/// One or more soft assertions failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{} soft assertion(s) failed:\n  - {}", .failures.len(), .failures.join("\n  - "))]
pub struct SoftAssertError {
    /// Failure messages, in the order they were recorded.
    pub failures: Vec<String>,
}

/// Collects failed checks and reports them all at the end.
#[derive(Debug, Default)]
pub struct SoftAssert {
    failures: Vec<String>,
    checks: usize,
}

impl SoftAssert {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure unless `condition` holds. Returns `condition`.
    pub fn check(&mut self, condition: bool, message: impl Into<String>) -> bool {
        self.checks += 1;
        if !condition {
            let message = message.into();
            warn!(failure = %message, "Soft assertion failed");
            self.failures.push(message);
        }
        condition
    }

    /// Record a failure unless `actual == expected`, naming the compared item.
    pub fn check_eq<A, E>(&mut self, what: &str, actual: A, expected: E) -> bool
    where
        A: PartialEq<E> + Debug,
        E: Debug,
    {
        let equal = actual == expected;
        self.check(equal, format!("{what}: {actual:?} != {expected:?}"))
    }

    /// Record a failure unless `actual != unexpected`.
    pub fn check_ne<A, E>(&mut self, what: &str, actual: A, unexpected: E) -> bool
    where
        A: PartialEq<E> + Debug,
        E: Debug,
    {
        let different = actual != unexpected;
        self.check(different, format!("{what}: {actual:?} == {unexpected:?}"))
    }

    /// Record a failure directly.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.check(false, message);
    }

    /// Failures recorded so far.
    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Number of checks made, passed or not.
    pub fn checks(&self) -> usize {
        self.checks
    }

    /// True if nothing failed.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another collector's results into this one.
    pub fn absorb(&mut self, other: SoftAssert) {
        self.checks += other.checks;
        self.failures.extend(other.failures);
    }

    /// Finish the pass, failing if any check failed.
    pub fn finish(self) -> Result<(), SoftAssertError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(SoftAssertError {
                failures: self.failures,
            })
        }
    }
}
