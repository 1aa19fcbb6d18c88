//! Wait configuration.

use std::time::Duration;

use crate::WaitError;

/// Smallest polling interval accepted; shorter delays are raised to this.
pub const MIN_DELAY: Duration = Duration::from_millis(10);

/// Default polling interval.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Default time budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long and how often to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Fixed interval between attempts.
    pub delay: Duration,

    /// Total time budget. An attempt landing exactly on it still runs.
    pub timeout: Duration,

    /// Optional message reported on timeout.
    pub message: Option<String>,

    /// Treat probe errors as failed attempts instead of aborting.
    pub handle_errors: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY, DEFAULT_TIMEOUT)
    }
}

impl WaitOptions {
    /// Create options with the given interval and budget.
    pub fn new(delay: Duration, timeout: Duration) -> Self {
        Self {
            delay: delay.max(MIN_DELAY),
            timeout,
            message: None,
            handle_errors: false,
        }
    }

    /// Create options from human-readable durations such as `"5s"` or `"15m"`.
    pub fn from_human(delay: &str, timeout: &str) -> Result<Self, WaitError> {
        Ok(Self::new(parse_duration(delay)?, parse_duration(timeout)?))
    }

    /// Create options from whole seconds.
    pub fn from_secs(delay_secs: u64, timeout_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(delay_secs),
            Duration::from_secs(timeout_secs),
        )
    }

    /// Set the message reported on timeout.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Treat probe errors as failed attempts.
    #[must_use]
    pub fn handle_errors(mut self, handle: bool) -> Self {
        self.handle_errors = handle;
        self
    }

    /// Upper bound on attempts a never-succeeding probe gets.
    ///
    /// `floor(timeout / delay) + 1`: the immediate attempt plus one per
    /// full interval that fits in the budget.
    pub fn max_attempts(&self) -> u64 {
        let delay = self.delay.as_nanos().max(1);
        u64::try_from(self.timeout.as_nanos() / delay)
            .unwrap_or(u64::MAX)
            .saturating_add(1)
    }
}

/// Parse a human-readable duration (`"20m"`, `"5s"`, `"1h 30m"`).
pub fn parse_duration(s: &str) -> Result<Duration, WaitError> {
    humantime::parse_duration(s.trim()).map_err(|e| WaitError::InvalidDuration(format!("{s:?}: {e}")))
}
