//! Wait errors.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by the wait primitives.
#[derive(Debug, Error)]
pub enum WaitError {
    /// No attempt succeeded within the time budget.
    #[error("{}", describe_timeout(.what, .message, .attempts, .elapsed, .last_error))]
    Timeout {
        what: String,
        message: Option<String>,
        attempts: u32,
        elapsed: Duration,
        last_error: Option<String>,
    },

    /// The probe failed; the wait was aborted.
    #[error("probe failed on attempt {attempt} while waiting for {what}")]
    Probe {
        what: String,
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The refresh action failed; the wait was aborted.
    #[error("refresh failed after attempt {attempt} while waiting for {what}")]
    Refresh {
        what: String,
        attempt: u32,
        #[source]
        source: anyhow::Error,
    },

    /// A human-readable duration could not be parsed.
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

impl WaitError {
    /// Returns true if the wait ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Number of attempts made before the wait ended, if it got that far.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Timeout { attempts, .. } => Some(*attempts),
            Self::Probe { attempt, .. } | Self::Refresh { attempt, .. } => Some(*attempt),
            Self::InvalidDuration(_) => None,
        }
    }
}

fn describe_timeout(
    what: &str,
    message: &Option<String>,
    attempts: &u32,
    elapsed: &Duration,
    last_error: &Option<String>,
) -> String {
    let mut out = match message {
        Some(message) => format!("{message} ({what})"),
        None => format!("timed out waiting for {what}"),
    };
    out.push_str(&format!(
        ": no success after {attempts} attempts in {}",
        humantime::format_duration(*elapsed)
    ));
    if let Some(err) = last_error {
        out.push_str(&format!("; last error: {err}"));
    }
    out
}
