//! Running a SmartState Analysis and waiting for its task.

use std::time::Duration;

use anyhow::Context;
use ssa_wait::{parse_duration, wait_until, WaitOptions, Waited};
use tracing::info;

use crate::appliance::{Appliance, Target};
use crate::SmartStateError;

/// Scan wait budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl ScanConfig {
    /// Load from `SSA_SCAN_DELAY` / `SSA_SCAN_TIMEOUT`, falling back to
    /// 5s / 15m.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let delay = std::env::var("SSA_SCAN_DELAY")
            .ok()
            .map(|v| parse_duration(&v))
            .transpose()
            .context("SSA_SCAN_DELAY must be a duration such as \"5s\".")?
            .unwrap_or(defaults.delay);

        let timeout = std::env::var("SSA_SCAN_TIMEOUT")
            .ok()
            .map(|v| parse_duration(&v))
            .transpose()
            .context("SSA_SCAN_TIMEOUT must be a duration such as \"15m\".")?
            .unwrap_or(defaults.timeout);

        Ok(Self { delay, timeout })
    }

    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(self.delay, self.timeout)
    }
}

/// Wait for the analysis task of `target_name` to finish, reloading the
/// tasks view between checks.
pub async fn wait_for_analysis<A>(
    appliance: &A,
    target_name: &str,
    opts: &WaitOptions,
) -> Result<Waited<()>, SmartStateError>
where
    A: Appliance + ?Sized,
{
    let opts = opts
        .clone()
        .with_message(format!("Waiting for SSA runs for {target_name} vm"));
    let what = format!("analysis of {target_name}");

    let waited = wait_until(
        &what,
        &opts,
        || appliance.is_analysis_finished(target_name),
        || appliance.reload_tasks(),
    )
    .await?;

    info!(
        target = target_name,
        attempts = waited.attempts,
        elapsed_ms = waited.elapsed.as_millis() as u64,
        "Analysis finished"
    );
    Ok(waited)
}

/// Start a SmartState Analysis of `target` and wait for it to finish.
pub async fn smartstate_scan<A>(
    appliance: &A,
    target: &Target,
    opts: &WaitOptions,
) -> Result<Waited<()>, SmartStateError>
where
    A: Appliance + ?Sized,
{
    info!(target = %target, "Starting SmartState Analysis");
    appliance.start_smartstate_scan(target).await?;
    wait_for_analysis(appliance, &target.name, opts).await
}
