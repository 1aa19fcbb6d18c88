use ssa_networking::NetworkError;
use ssa_wait::WaitError;
use thiserror::Error;

use crate::record::StatMismatch;

/// Inventory errors.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The record never appeared, or the lookup failed.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// The record exists but its stats differ from the expected ones.
    #[error("{collection} {ems_ref}: {} stat(s) differ: {}", .mismatches.len(), describe(.mismatches))]
    StatsMismatch {
        collection: String,
        ems_ref: String,
        mismatches: Vec<StatMismatch>,
    },

    /// The provider has no floating IP with the id a port points at.
    #[error("floating IP {0} not found on provider")]
    MissingFloatingIp(String),

    /// Provider-side network data is malformed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A provider or inventory call failed.
    #[error("{0}")]
    Provider(#[source] anyhow::Error),
}

impl InventoryError {
    /// Returns true if the record never showed up in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Wait(err) if err.is_timeout())
    }
}

fn describe(mismatches: &[StatMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
