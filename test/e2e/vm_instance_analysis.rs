//! End-to-end SmartState Analysis of provisioned VMs.
//!
//! Each test provisions a VM from provider data on a mock provider,
//! registers it with a mock appliance sharing the guest, and runs the
//! checks the way a verification run does:
//!
//! 1. Prepare the provider (VDDK, host credentials, server roles)
//! 2. Provision the VM and wait for SSH
//! 3. Profile the VM so scans collect files
//! 4. Scan and compare with facts collected over the shell
//! 5. Tear everything down
//!
//! ## Running
//!
//! ```bash
//! cargo test -p ssa-e2e --test vm_instance_analysis
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use ssa_smartstate::checks::{
    compare_summary, expected_facts, verify_compliance_analysis, verify_files, verify_groups,
    verify_packages, verify_scheduled_analysis, verify_template_analysis, verify_users,
    verify_vm_analysis, CheckOutcome,
};
use ssa_smartstate::config::{ProviderData, ProviderEntry, SuiteConfig};
use ssa_smartstate::drift::{drift_count, verify_drift_analysis};
use ssa_smartstate::facts::add_user;
use ssa_smartstate::mock::{GuestConnector, MockAppliance, MockGuest, MockProvider};
use ssa_smartstate::policy::{ComplianceProfile, PolicyTarget, ProfiledVm};
use ssa_smartstate::provision::{prepare_provider, provision_ssa_vm, reset_provider, SsaVm};
use ssa_smartstate::scan::smartstate_scan;
use ssa_smartstate::summary::ScanSummary;
use ssa_smartstate::{Appliance, ControlApi, SmartStateError, SystemType, Target};
use ssa_testing::SoftAssert;
use ssa_wait::WaitOptions;
use tracing::info;

const PROVIDER_DATA: &str = r#"
[providers.vsphere67]
name = "vsphere67"
type = "virtualcenter"

[[providers.vsphere67.hosts]]
name = "esx-1"
principal = "root"

[providers.vsphere67.vm_analysis.provisioning]
host = "esx-1"
datastore = "datastore1"
username = "root"

[providers.vsphere67.vm_analysis.vms.rhel7]
image = "rhel7-ssa"
fs-type = "xfs"

[providers.vsphere67.vm_analysis.vms.centos7]
image = "centos7-ssa"
fs-type = "xfs"

[providers.vsphere67.vm_analysis.vms.ntfs]
image = "win2012-ssa"
fs-type = "ntfs"

[providers.osp13]
name = "osp13"
type = "openstack"
public_network = "public"

[providers.osp13.vm_analysis.provisioning]
instance_type = "m1.small"
username = "cloud-user"

[providers.osp13.vm_analysis.vms.fedora]
image = "fedora-ssa"
fs-type = "xfs"
"#;

/// Run settings as a verification run would export them.
fn suite_config() -> SuiteConfig {
    temp_env::with_vars(
        [
            ("SSA_SCAN_DELAY", Some("5s")),
            ("SSA_SCAN_TIMEOUT", Some("15m")),
            ("SSA_PROVIDER_DATA", None),
        ],
        SuiteConfig::from_env,
    )
    .unwrap()
}

/// One provider's worth of collaborators.
struct Suite {
    config: SuiteConfig,
    data: ProviderData,
    provider_key: String,
    appliance: MockAppliance,
    mgmt: MockProvider,
}

impl Suite {
    fn new(provider_key: &str) -> Self {
        ssa_testing::init_tracing();
        let data = ProviderData::parse(PROVIDER_DATA, Path::new("providers.toml")).unwrap();
        let entry = data.provider(provider_key).unwrap();
        let mgmt = MockProvider::new(&entry.name, entry.kind)
            .with_guest_image("rhel7-ssa", MockGuest::rhel())
            .with_guest_image("centos7-ssa", MockGuest::centos())
            .with_guest_image("fedora-ssa", MockGuest::fedora())
            .with_guest_image("win2012-ssa", MockGuest::windows())
            .with_ip_after(2)
            .boots_stopped();

        Self {
            config: suite_config(),
            data,
            provider_key: provider_key.to_string(),
            appliance: MockAppliance::new().with_analysis_polls(2),
            mgmt,
        }
    }

    fn scan_opts(&self) -> WaitOptions {
        self.config.scan.wait_options()
    }

    fn entry(&self) -> &ProviderEntry {
        self.data.provider(&self.provider_key).unwrap()
    }

    /// Prepare the provider and bring up a VM of `analysis_type`, known to
    /// the appliance.
    async fn provision(&self, analysis_type: &str) -> SsaVm {
        let entry = self.entry();
        prepare_provider(&self.appliance, entry.kind, &entry.hosts)
            .await
            .unwrap();

        let resolved = self
            .data
            .provisioning_data(&self.provider_key, analysis_type)
            .unwrap();
        let connector = GuestConnector::new(&self.mgmt).with_failed_connects(3);
        let vm = provision_ssa_vm(&self.mgmt, &connector, &resolved, &self.config.provision)
            .await
            .unwrap();
        info!(vm = vm.name(), ip = %vm.connect_ip, system = %vm.system_type, "Suite VM ready");

        self.appliance
            .register(&vm.target, self.mgmt.guest(vm.name()).unwrap());
        self.appliance.set_server_relationship(vm.name()).await.unwrap();
        vm
    }

    async fn teardown(&self, vm: SsaVm) {
        let name = vm.name().to_string();
        info!(vm = %name, "Tearing down suite VM");
        vm.cleanup(&self.mgmt).await.unwrap();
        assert!(!self.mgmt.exists(&name));

        let entry = self.entry();
        reset_provider(&self.appliance, entry.kind, &entry.hosts)
            .await
            .unwrap();
        assert!(self.appliance.host_credentials().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn rhel_vm_full_analysis() {
    let suite = Suite::new("vsphere67");
    let vm = suite.provision("rhel7").await;
    assert_eq!(vm.system_type.flavor().map(|f| f.key), Some("rhel"));
    assert!(suite.appliance.vddk_installed());
    assert_eq!(suite.appliance.server_relationships(), vec![vm.name().to_string()]);

    let profiled = ProfiledVm::setup(&suite.appliance, vm.name()).await.unwrap();
    let appliance = &suite.appliance;

    assert_eq!(
        verify_vm_analysis(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Passed
    );
    assert_eq!(
        verify_users(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Passed
    );
    assert_eq!(
        verify_groups(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Passed
    );
    assert_eq!(
        verify_packages(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Passed
    );
    assert_eq!(
        verify_files(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Passed
    );

    profiled.teardown(appliance).await.unwrap();
    assert_eq!(appliance.policy_object_count(), 0);
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn centos_package_install_shows_up_in_scan() {
    let suite = Suite::new("vsphere67");
    let vm = suite.provision("centos7").await;
    let guest = suite.mgmt.guest(vm.name()).unwrap();
    let before = guest.snapshot().packages.len();

    verify_packages(&suite.appliance, &vm, &suite.scan_opts())
        .await
        .unwrap();

    let after = guest.snapshot();
    assert_eq!(after.packages.len(), before + 1);
    assert!(after.packages.iter().any(|p| p == "iso-codes"));
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn files_need_an_analysis_profile() {
    let suite = Suite::new("vsphere67");
    let vm = suite.provision("centos7").await;

    let err = verify_files(&suite.appliance, &vm, &suite.scan_opts())
        .await
        .unwrap_err();
    assert!(matches!(err, SmartStateError::Mismatch { .. }));

    let profiled = ProfiledVm::setup(&suite.appliance, vm.name()).await.unwrap();
    verify_files(&suite.appliance, &vm, &suite.scan_opts())
        .await
        .unwrap();
    profiled.teardown(&suite.appliance).await.unwrap();
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn windows_vm_analysis_skips_unix_checks() {
    let suite = Suite::new("vsphere67");
    let vm = suite.provision("ntfs").await;
    assert_eq!(vm.system_type, SystemType::Windows);
    assert!(vm.shell.is_none());

    let appliance = &suite.appliance;
    assert_eq!(
        verify_vm_analysis(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Passed
    );
    assert_eq!(
        verify_users(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Passed
    );
    assert!(matches!(
        verify_packages(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Skipped(_)
    ));
    assert!(matches!(
        verify_files(appliance, &vm, &suite.scan_opts()).await.unwrap(),
        CheckOutcome::Skipped(_)
    ));
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn drift_history_tracks_tagging() {
    let suite = Suite::new("vsphere67");
    let vm = suite.provision("rhel7").await;

    verify_drift_analysis(
        &suite.appliance,
        &vm.target,
        &suite.scan_opts(),
        &suite.config.drift.wait_options(),
    )
    .await
    .unwrap();

    assert_eq!(drift_count(&suite.appliance, &vm.target).await.unwrap(), 2);
    assert!(suite.appliance.tags(&vm.target).is_empty());
    assert!(suite.appliance.detail_reloads() > 0);
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn scheduled_analysis_runs_once_and_is_removed() {
    let suite = Suite::new("vsphere67");
    let vm = suite.provision("rhel7").await;
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 58, 0).unwrap();

    let outcome = verify_scheduled_analysis(
        &suite.appliance,
        &suite.appliance,
        &vm,
        now,
        &suite.scan_opts(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, CheckOutcome::Passed);
    assert!(suite.appliance.schedules().is_empty());
    assert_ne!(suite.appliance.last_analyzed(&vm.target).await.unwrap(), "Never");
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn compliance_policy_analyses_provisioned_vm() {
    let suite = Suite::new("osp13");
    let compliance = ComplianceProfile::setup(&suite.appliance, &suite.entry().name)
        .await
        .unwrap();

    let vm = suite.provision("fedora").await;
    assert_eq!(
        suite.mgmt.floating_ip_network(vm.name()).as_deref(),
        Some("public")
    );
    suite.appliance.provision_complete(&vm.target).unwrap();

    assert_eq!(
        verify_compliance_analysis(&suite.appliance, &vm, &suite.scan_opts())
            .await
            .unwrap(),
        CheckOutcome::Passed
    );

    compliance.teardown(&suite.appliance).await.unwrap();
    assert!(suite
        .appliance
        .assigned_profiles(&PolicyTarget::Provider("osp13".to_string()))
        .is_empty());
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn compliance_wait_times_out_without_policy() {
    let suite = Suite::new("osp13");
    let vm = suite.provision("fedora").await;
    suite.appliance.provision_complete(&vm.target).unwrap();

    let err = verify_compliance_analysis(&suite.appliance, &vm, &WaitOptions::from_secs(5, 60))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(err
        .to_string()
        .contains(&format!("Waiting for SSA runs for {} vm", vm.name())));
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn template_analysis_populates_summary() {
    let suite = Suite::new("vsphere67");
    let template = Target::template("rhel7-ssa", "vsphere67");
    suite.appliance.register(&template, MockGuest::rhel());

    let before = suite.appliance.last_analyzed(&template).await.unwrap();
    assert_eq!(before, "Never");

    assert_eq!(
        verify_template_analysis(&suite.appliance, &template, false, &suite.scan_opts())
            .await
            .unwrap(),
        CheckOutcome::Passed
    );

    let windows = Target::template("win2012-ssa", "vsphere67");
    suite.appliance.register(&windows, MockGuest::windows());
    verify_template_analysis(&suite.appliance, &windows, true, &suite.scan_opts())
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn stale_scan_is_caught_by_comparison() {
    let suite = Suite::new("vsphere67");
    let vm = suite.provision("rhel7").await;

    smartstate_scan(&suite.appliance, &vm.target, &suite.scan_opts())
        .await
        .unwrap();
    add_user(vm.shell().unwrap(), "late-user").await.unwrap();

    let expected = expected_facts(&vm).await.unwrap();
    let summary = ScanSummary::read(&suite.appliance, &vm.target, false)
        .await
        .unwrap();
    let mut soft = SoftAssert::new();
    compare_summary(&mut soft, &vm.system_type, &summary, expected.as_ref());

    assert_eq!(soft.failures().len(), 1);
    assert!(soft.failures()[0].starts_with("users:"));
    suite.teardown(vm).await;
}

#[tokio::test(start_paused = true)]
async fn provisioning_waits_for_ip_and_ssh() {
    let suite = Suite::new("vsphere67");
    let start = tokio::time::Instant::now();
    let vm = suite.provision("centos7").await;

    // Stopped VM started on the first IP poll, IP on the third poll, then
    // three refused SSH attempts before the fourth succeeds.
    assert_eq!(suite.mgmt.starts(vm.name()), 1);
    assert_eq!(start.elapsed(), Duration::from_secs(10 + 15));
    suite.teardown(vm).await;
}
