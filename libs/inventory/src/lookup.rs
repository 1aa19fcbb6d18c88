//! Waiting for records to appear in the inventory.

use std::time::Duration;

use anyhow::{Context, Result};
use ssa_wait::{parse_duration, wait_for, WaitOptions};
use tracing::info;

use crate::{Inventory, InventoryError, InventoryRecord};

/// How long to wait for a provider object to show up in the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    /// Interval between lookups.
    pub delay: Duration,

    /// Total time budget.
    pub timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        }
    }
}

impl LookupConfig {
    /// Load from `SSA_INVENTORY_DELAY` / `SSA_INVENTORY_TIMEOUT` (human
    /// durations), falling back to 5s / 60s.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let delay = std::env::var("SSA_INVENTORY_DELAY")
            .ok()
            .map(|v| parse_duration(&v))
            .transpose()
            .context("SSA_INVENTORY_DELAY must be a duration such as \"5s\".")?
            .unwrap_or(defaults.delay);

        let timeout = std::env::var("SSA_INVENTORY_TIMEOUT")
            .ok()
            .map(|v| parse_duration(&v))
            .transpose()
            .context("SSA_INVENTORY_TIMEOUT must be a duration such as \"60s\".")?
            .unwrap_or(defaults.timeout);

        Ok(Self { delay, timeout })
    }

    /// Wait options for these settings.
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(self.delay, self.timeout)
    }
}

/// Poll the inventory until the record mirroring `ems_ref` appears.
///
/// Absence after the timeout is an error: it means the product failed to
/// sync an object that exists on the provider.
pub async fn object_in_inventory_with_timeout<I>(
    inventory: &I,
    collection: &str,
    provider: &str,
    ems_ref: &str,
    opts: &WaitOptions,
) -> Result<InventoryRecord, InventoryError>
where
    I: Inventory + ?Sized,
{
    let what = format!("{collection} with ems_ref {ems_ref}");
    let waited = wait_for(&what, opts, || async move {
        info!(collection, ems_ref, provider, "Looking for record in the inventory");
        inventory.find_by_ems_ref(collection, ems_ref, provider).await
    })
    .await?;

    info!(
        collection,
        ems_ref,
        attempts = waited.attempts,
        elapsed_ms = waited.elapsed.as_millis() as u64,
        "Found record in the inventory"
    );
    Ok(waited.value)
}
