use ssa_testing::SoftAssertError;
use ssa_wait::WaitError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::SummaryField;

/// SmartState verification errors.
#[derive(Debug, Error)]
pub enum SmartStateError {
    /// A wait timed out, or its probe or refresh failed.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// A guest command exited non-zero.
    #[error("command `{command}` failed with exit code {rc}: {output}")]
    Command {
        command: String,
        rc: i32,
        output: String,
    },

    /// `/etc/os-release` matched none of the known systems.
    #[error("unrecognised guest operating system: {0}")]
    UnknownSystem(String),

    /// A scanned value differs from the one collected on the guest.
    #[error("{field}: expected {expected:?}, scan shows {actual:?}")]
    Mismatch {
        field: SummaryField,
        expected: String,
        actual: String,
    },

    /// An item expected in a details table is not listed.
    #[error("{name} was not found in the {field} details table after SSA run")]
    RowNotFound { field: SummaryField, name: String },

    /// The check needs a shell on the guest but the VM has none.
    #[error("no remote shell available for {0}")]
    NoShell(String),

    /// One or more soft comparisons failed.
    #[error(transparent)]
    SoftAssertions(#[from] SoftAssertError),

    /// Test data or settings are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A collaborator (appliance, provider, shell) call failed.
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

impl SmartStateError {
    /// Returns true if a wait ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Wait(err) if err.is_timeout())
    }
}
