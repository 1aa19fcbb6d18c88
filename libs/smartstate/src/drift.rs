//! Drift history: differences between successive scans of a VM.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use ssa_testing::SoftAssert;
use ssa_wait::{wait_until, WaitOptions};
use tracing::{info, warn};

use crate::appliance::{Appliance, Target};
use crate::scan::smartstate_scan;
use crate::{SmartStateError, SummaryField};

/// Section of the drift view holding tag rows.
pub const COMPANY_TAGS_SECTION: &str = "My Company Tags";

/// A company tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Tag {
    pub category: String,
    pub display_name: String,
}

impl Tag {
    pub fn new(category: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            display_name: display_name.into(),
        }
    }

    /// The tag the drift check applies between scans.
    pub fn department_accounting() -> Self {
        Self::new("Department", "Accounting")
    }

    /// The drift row for this tag's category when it holds one tag.
    pub fn drift_row(&self) -> String {
        format!("{} (1)", self.category)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.display_name)
    }
}

/// Drift view attribute filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DriftFilter {
    /// Show attributes whose values are the same in all compared scans.
    SameValues,
    /// Show attributes whose values differ.
    DifferentValues,
}

/// Drift wait budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftConfig {
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(20),
            timeout: Duration::from_secs(360),
        }
    }
}

impl DriftConfig {
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new(self.delay, self.timeout)
            .with_message("Waiting for Drift History count to increase")
    }
}

/// Parse the `Drift History` summary text. `"None"` means no entries.
pub fn parse_drift_count(text: &str) -> Result<u32, SmartStateError> {
    let text = text.trim();
    if text == "None" {
        return Ok(0);
    }
    text.parse().map_err(|_| {
        SmartStateError::Other(anyhow::anyhow!("unexpected Drift History value {text:?}"))
    })
}

/// Current drift history count of `target`.
pub async fn drift_count<A>(appliance: &A, target: &Target) -> Result<u32, SmartStateError>
where
    A: Appliance + ?Sized,
{
    let text = appliance
        .summary_text(target, SummaryField::DriftHistory)
        .await?;
    parse_drift_count(&text)
}

/// Wait until the drift history of `target` reads `expected`, reloading the
/// details page between checks.
pub async fn wait_for_drift_count<A>(
    appliance: &A,
    target: &Target,
    expected: u32,
    opts: &WaitOptions,
) -> Result<(), SmartStateError>
where
    A: Appliance + ?Sized,
{
    let expected_text = expected.to_string();
    let what = format!("drift history {expected} on {}", target.name);

    wait_until(
        &what,
        opts,
        || {
            let expected_text = &expected_text;
            async move {
                let text = appliance
                    .summary_text(target, SummaryField::DriftHistory)
                    .await?;
                Ok(text.trim() == expected_text.as_str())
            }
        },
        || appliance.reload_details(target),
    )
    .await?;
    Ok(())
}

/// Scan twice, tagging the VM in between, and check the drift view shows
/// the tag as the only difference.
///
/// The tag is removed again whatever the outcome.
pub async fn verify_drift_analysis<A>(
    appliance: &A,
    target: &Target,
    scan_opts: &WaitOptions,
    drift_opts: &WaitOptions,
) -> Result<(), SmartStateError>
where
    A: Appliance + ?Sized,
{
    let original = drift_count(appliance, target).await?;
    info!(vm = %target.name, drift = original, "Drift history before scan");

    smartstate_scan(appliance, target, scan_opts).await?;
    wait_for_drift_count(appliance, target, original + 1, drift_opts).await?;
    let after_first = drift_count(appliance, target).await?;

    let tag = Tag::department_accounting();
    appliance.add_tag(target, &tag).await?;

    let result = tagged_drift(appliance, target, &tag, after_first, scan_opts, drift_opts).await;

    if let Err(err) = appliance.remove_tag(target, &tag).await {
        warn!(vm = %target.name, tag = %tag, error = %err, "Failed to remove tag");
        result?;
        return Err(err.into());
    }
    result
}

async fn tagged_drift<A>(
    appliance: &A,
    target: &Target,
    tag: &Tag,
    drift_before: u32,
    scan_opts: &WaitOptions,
    drift_opts: &WaitOptions,
) -> Result<(), SmartStateError>
where
    A: Appliance + ?Sized,
{
    smartstate_scan(appliance, target, scan_opts).await?;
    wait_for_drift_count(appliance, target, drift_before + 1, drift_opts).await?;

    let row = tag.drift_row();
    let mut soft = SoftAssert::new();

    let equal = appliance
        .equal_drift_results(target, &row, COMPANY_TAGS_SECTION, 0, 1)
        .await?;
    soft.check(!equal, "Drift analysis results are equal when they shouldn't be");

    let hidden = !appliance
        .drift_attribute_visible(target, DriftFilter::SameValues, &tag.category)
        .await?;
    soft.check(
        hidden,
        format!("{} row should be hidden, but not", tag.display_name),
    );

    let visible = appliance
        .drift_attribute_visible(target, DriftFilter::DifferentValues, &row)
        .await?;
    soft.check(
        visible,
        format!("{} row should be visible, but not", tag.display_name),
    );

    soft.finish()?;
    Ok(())
}
