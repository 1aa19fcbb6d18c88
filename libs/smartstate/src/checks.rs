//! Comparisons between scan results and the guest itself.

use chrono::{DateTime, Utc};
use ssa_testing::{gen_alpha, SoftAssert};
use ssa_wait::WaitOptions;
use tracing::{info, warn};

use crate::appliance::{Appliance, ControlApi, Target};
use crate::facts::{self, ExpectedFacts};
use crate::policy::SSA_EXPECT_FILES;
use crate::provision::SsaVm;
use crate::scan::{smartstate_scan, wait_for_analysis};
use crate::schedule::schedule_analysis;
use crate::summary::ScanSummary;
use crate::system::SystemType;
use crate::{SmartStateError, SummaryField};

/// Result of a check that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    /// Not applicable to the guest.
    Skipped(String),
}

impl CheckOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

/// Collect reference facts over the VM's shell. `None` on Windows.
pub async fn expected_facts(vm: &SsaVm) -> Result<Option<ExpectedFacts>, SmartStateError> {
    match vm.system_type.flavor() {
        Some(flavor) => Ok(Some(facts::collect_expected_facts(vm.shell()?, flavor).await?)),
        None => Ok(None),
    }
}

/// Soft-check that every Windows-only count is non-zero.
pub fn check_windows_counts(soft: &mut SoftAssert, summary: &ScanSummary) {
    for (field, value) in &summary.windows {
        soft.check_ne(field.label(), value.as_str(), "0");
    }
}

/// Soft-check a scan summary against the guest.
///
/// `expected` is required for Unix guests and ignored for Windows ones.
pub fn compare_summary(
    soft: &mut SoftAssert,
    system: &SystemType,
    summary: &ScanSummary,
    expected: Option<&ExpectedFacts>,
) {
    soft.check(!summary.never_analyzed(), "Last Analyzed is set to Never");

    let details_os = system.details_os_name();
    soft.check(
        summary.operating_system.to_lowercase().contains(details_os),
        format!(
            "details icon: {details_os:?} not in {:?}",
            summary.operating_system
        ),
    );
    let os_type = system.os_type();
    soft.check(
        summary.quadicon_os.to_lowercase().contains(os_type),
        format!("quad icon: {os_type:?} not in {:?}", summary.quadicon_os),
    );

    match (system, expected) {
        (SystemType::Windows, _) => check_windows_counts(soft, summary),
        (SystemType::Unix(_), Some(expected)) => {
            soft.check_eq("users", summary.users.as_str(), expected.users.as_str());
            soft.check_eq("groups", summary.groups.as_str(), expected.groups.as_str());
            soft.check_eq(
                "packages",
                summary.packages.as_deref(),
                Some(expected.packages.as_str()),
            );
            soft.check_eq(
                "services",
                summary.services.as_deref(),
                Some(expected.services.as_str()),
            );
        }
        (SystemType::Unix(_), None) => soft.fail("no expected facts collected for a Unix guest"),
    }
}

async fn compare_with_guest<A>(
    appliance: &A,
    vm: &SsaVm,
    expected: Option<&ExpectedFacts>,
) -> Result<(), SmartStateError>
where
    A: Appliance + ?Sized,
{
    let summary = ScanSummary::read(appliance, &vm.target, vm.system_type.is_windows()).await?;
    info!(
        vm = %vm.name(),
        os = %summary.operating_system,
        quadicon = %summary.quadicon_os,
        users = %summary.users,
        groups = %summary.groups,
        packages = ?summary.packages,
        services = ?summary.services,
        "SSA results"
    );

    let mut soft = SoftAssert::new();
    compare_summary(&mut soft, &vm.system_type, &summary, expected);
    soft.finish()?;
    Ok(())
}

/// Scan a template and check the summary is populated.
pub async fn verify_template_analysis<A>(
    appliance: &A,
    template: &Target,
    windows: bool,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    A: Appliance + ?Sized,
{
    smartstate_scan(appliance, template, opts).await?;

    let quadicon = appliance.quadicon_os(template).await?;
    let details = appliance
        .summary_text(template, SummaryField::OperatingSystem)
        .await?;
    info!(template = %template.name, quadicon = %quadicon, details = %details, "Icons");

    let summary = ScanSummary::read(appliance, template, windows).await?;

    let mut soft = SoftAssert::new();
    if windows {
        check_windows_counts(&mut soft, &summary);
    } else {
        soft.check_ne("users", summary.users.as_str(), "0");
        soft.check_ne("groups", summary.groups.as_str(), "0");
        soft.check_ne("packages", summary.packages.as_deref(), Some("0"));
    }
    soft.finish()?;
    Ok(CheckOutcome::Passed)
}

/// Collect facts, scan, and compare.
pub async fn verify_vm_analysis<A>(
    appliance: &A,
    vm: &SsaVm,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    A: Appliance + ?Sized,
{
    let expected = expected_facts(vm).await?;
    smartstate_scan(appliance, &vm.target, opts).await?;
    compare_with_guest(appliance, vm, expected.as_ref()).await?;
    Ok(CheckOutcome::Passed)
}

/// Collect facts, wait for an analysis started by policy, and compare.
pub async fn verify_compliance_analysis<A>(
    appliance: &A,
    vm: &SsaVm,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    A: Appliance + ?Sized,
{
    let expected = expected_facts(vm).await?;
    wait_for_analysis(appliance, vm.name(), opts).await?;
    compare_with_guest(appliance, vm, expected.as_ref()).await?;
    Ok(CheckOutcome::Passed)
}

/// Schedule a one-off analysis, wait for it, and compare.
///
/// The schedule is deleted afterwards.
pub async fn verify_scheduled_analysis<C, A>(
    control: &C,
    appliance: &A,
    vm: &SsaVm,
    now: DateTime<Utc>,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    C: ControlApi + ?Sized,
    A: Appliance + ?Sized,
{
    let schedule = schedule_analysis(control, appliance, &vm.target, now, opts).await?;

    let result = async {
        let expected = expected_facts(vm).await?;
        compare_with_guest(appliance, vm, expected.as_ref()).await
    }
    .await;

    if let Err(err) = control.delete_schedule(&schedule.name).await {
        warn!(schedule = %schedule.name, error = %err, "Failed to delete schedule");
    }
    result.map(|()| CheckOutcome::Passed)
}

async fn require_row<A>(
    appliance: &A,
    target: &Target,
    field: SummaryField,
    name: &str,
) -> Result<(), SmartStateError>
where
    A: Appliance + ?Sized,
{
    let rows = appliance.detail_rows(target, field).await?;
    if rows.iter().any(|row| row == name) {
        Ok(())
    } else {
        Err(SmartStateError::RowNotFound {
            field,
            name: name.to_string(),
        })
    }
}

fn require_equal(field: SummaryField, actual: String, expected: String) -> Result<(), SmartStateError> {
    if actual == expected {
        Ok(())
    } else {
        Err(SmartStateError::Mismatch {
            field,
            expected,
            actual,
        })
    }
}

/// Add an account (user or group) on the guest, scan, and check the count
/// and listing.
async fn verify_new_account<A>(
    appliance: &A,
    vm: &SsaVm,
    field: SummaryField,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    A: Appliance + ?Sized,
{
    if vm.system_type.is_windows() {
        // Accounts cannot be added on Windows guests; only check the
        // listing renders.
        smartstate_scan(appliance, &vm.target, opts).await?;
        let current = appliance.summary_text(&vm.target, field).await?;
        appliance.detail_rows(&vm.target, field).await?;
        info!(vm = %vm.name(), field = %field, current = %current, "Windows account listing read");
        return Ok(CheckOutcome::Passed);
    }

    let shell = vm.shell()?;
    let name = gen_alpha(10);
    // Force a fresh connection.
    shell.close().await?;
    let expected = match field {
        SummaryField::Groups => facts::add_group(shell, &name).await?,
        _ => facts::add_user(shell, &name).await?,
    };

    smartstate_scan(appliance, &vm.target, opts).await?;

    let current = appliance.summary_text(&vm.target, field).await?;
    require_equal(field, current, expected)?;
    require_row(appliance, &vm.target, field, &name).await?;
    Ok(CheckOutcome::Passed)
}

/// A new user shows up in the scan.
pub async fn verify_users<A>(
    appliance: &A,
    vm: &SsaVm,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    A: Appliance + ?Sized,
{
    verify_new_account(appliance, vm, SummaryField::Users, opts).await
}

/// A new group shows up in the scan.
pub async fn verify_groups<A>(
    appliance: &A,
    vm: &SsaVm,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    A: Appliance + ?Sized,
{
    verify_new_account(appliance, vm, SummaryField::Groups, opts).await
}

/// A newly installed package shows up in the scan.
pub async fn verify_packages<A>(
    appliance: &A,
    vm: &SsaVm,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    A: Appliance + ?Sized,
{
    let Some(flavor) = vm.system_type.flavor() else {
        return Ok(CheckOutcome::skipped("Windows has no packages"));
    };

    let shell = vm.shell()?;
    shell.close().await?;
    let expected = facts::install_package(shell, flavor).await?;

    smartstate_scan(appliance, &vm.target, opts).await?;

    let current = appliance
        .summary_text(&vm.target, SummaryField::Packages)
        .await?;
    require_equal(SummaryField::Packages, current, expected)?;
    require_row(appliance, &vm.target, SummaryField::Packages, flavor.package).await?;
    Ok(CheckOutcome::Passed)
}

/// The analysis profile's files are collected.
pub async fn verify_files<A>(
    appliance: &A,
    vm: &SsaVm,
    opts: &WaitOptions,
) -> Result<CheckOutcome, SmartStateError>
where
    A: Appliance + ?Sized,
{
    if vm.system_type.is_windows() {
        return Ok(CheckOutcome::skipped("We cannot verify Windows files yet"));
    }

    smartstate_scan(appliance, &vm.target, opts).await?;

    let current = appliance
        .summary_text(&vm.target, SummaryField::Files)
        .await?;
    if current == "0" {
        return Err(SmartStateError::Mismatch {
            field: SummaryField::Files,
            expected: "at least one scanned file".to_string(),
            actual: current,
        });
    }
    require_row(appliance, &vm.target, SummaryField::Files, SSA_EXPECT_FILES[0]).await?;
    Ok(CheckOutcome::Passed)
}
