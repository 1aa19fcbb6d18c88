//! Bringing up a VM ready for analysis.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use ssa_testing::gen_alphanumeric;
use ssa_wait::{wait_for, WaitOptions};
use tracing::{info, warn};

use crate::appliance::{ControlApi, Target};
use crate::config::{HostCredentials, ProviderKind, ProvisioningData, ResolvedProvisioning};
use crate::facts::{query, OS_RELEASE_COMMAND};
use crate::shell::RemoteShell;
use crate::system::{detect_system_type, SystemType};
use crate::SmartStateError;

/// Login for the guest's management channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestCredentials {
    pub username: String,

    /// Carried from the test data; key or agent auth is used to connect.
    #[serde(skip)]
    pub password: Option<String>,
}

/// A VM creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRequest {
    pub name: String,
    pub image: String,
    pub data: ProvisioningData,
}

/// Provider-side VM management.
#[async_trait]
pub trait ProviderMgmt: Send + Sync {
    /// Provider name as registered in the appliance.
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    async fn create_vm(&self, request: &VmRequest) -> Result<()>;

    async fn vm_status(&self, name: &str) -> Result<String>;

    async fn is_vm_stopped(&self, name: &str) -> Result<bool>;

    async fn start_vm(&self, name: &str) -> Result<()>;

    async fn current_ip_address(&self, name: &str) -> Result<Option<String>>;

    async fn assign_floating_ip(&self, name: &str, network: &str) -> Result<()>;

    async fn delete_vm(&self, name: &str) -> Result<()>;
}

/// Opens management channels to guests.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        credentials: &GuestCredentials,
    ) -> Result<Box<dyn RemoteShell>>;
}

/// Provisioning wait budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub ip_delay: Duration,
    pub ip_timeout: Duration,
    pub ssh_delay: Duration,
    pub ssh_timeout: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            ip_delay: Duration::from_secs(5),
            ip_timeout: Duration::from_secs(20 * 60),
            ssh_delay: Duration::from_secs(5),
            ssh_timeout: Duration::from_secs(3600),
        }
    }
}

/// A provisioned VM under analysis.
pub struct SsaVm {
    pub target: Target,
    pub analysis_type: String,
    pub connect_ip: String,
    pub system_type: SystemType,

    /// Management channel; absent on Windows guests.
    pub shell: Option<Box<dyn RemoteShell>>,
}

impl std::fmt::Debug for SsaVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsaVm")
            .field("target", &self.target)
            .field("analysis_type", &self.analysis_type)
            .field("connect_ip", &self.connect_ip)
            .field("system_type", &self.system_type)
            .field("shell", &self.shell.is_some())
            .finish()
    }
}

impl SsaVm {
    pub fn name(&self) -> &str {
        &self.target.name
    }

    /// The management channel, or an error naming the VM.
    pub fn shell(&self) -> Result<&dyn RemoteShell, SmartStateError> {
        self.shell
            .as_deref()
            .ok_or_else(|| SmartStateError::NoShell(self.target.name.clone()))
    }

    /// Close the shell and delete the VM from the provider.
    pub async fn cleanup<M>(self, mgmt: &M) -> Result<(), SmartStateError>
    where
        M: ProviderMgmt + ?Sized,
    {
        if let Some(shell) = &self.shell {
            if let Err(err) = shell.close().await {
                warn!(vm = %self.target.name, error = %err, "Failed to close shell");
            }
        }
        info!(vm = %self.target.name, "Deleting VM");
        mgmt.delete_vm(&self.target.name).await?;
        Ok(())
    }
}

/// Name for a new analysis VM.
pub fn ssa_vm_name(analysis_type: &str) -> String {
    format!("test-ssa-{}-{}", gen_alphanumeric(8), analysis_type)
}

/// Wait until the provider reports an IP for `name`, starting the VM
/// whenever it is found stopped.
pub async fn wait_for_ip<M>(mgmt: &M, name: &str, opts: &WaitOptions) -> Result<String, SmartStateError>
where
    M: ProviderMgmt + ?Sized,
{
    let waited = wait_for(&format!("IP address of {name}"), opts, || async move {
        let status = mgmt.vm_status(name).await?;
        let stopped = mgmt.is_vm_stopped(name).await?;
        info!(vm = name, status = %status, stopped, "Power state");
        if stopped {
            mgmt.start_vm(name).await?;
        }
        let ip = mgmt.current_ip_address(name).await?;
        info!(vm = name, ip = ?ip, "Fetched IP");
        Ok(ip)
    })
    .await?;
    Ok(waited.value)
}

/// Wait until the guest answers over its shell.
///
/// Connection errors count as failed attempts; a guest can take most of an
/// hour to finish first boot.
pub async fn wait_for_shell(
    shell: &dyn RemoteShell,
    vm_name: &str,
    opts: &WaitOptions,
) -> Result<Duration, SmartStateError> {
    let opts = opts.clone().handle_errors(true);
    let waited = wait_for(&format!("SSH on {vm_name}"), &opts, || async move {
        let uptime = shell.uptime().await?;
        Ok((!uptime.is_zero()).then_some(uptime))
    })
    .await?;
    Ok(waited.value)
}

/// Identify the guest's system from `/etc/os-release`.
pub async fn detect_guest_system(shell: &dyn RemoteShell) -> Result<SystemType, SmartStateError> {
    let os_release = query(shell, OS_RELEASE_COMMAND).await?;
    detect_system_type(&os_release).ok_or_else(|| {
        SmartStateError::UnknownSystem(os_release.lines().next().unwrap_or_default().to_string())
    })
}

/// Create a VM for `data`, wait for it to come up, and identify its system.
///
/// Windows guests (by filesystem type) get no shell and are assumed to be
/// Windows. If anything fails after the VM was created, the VM is deleted
/// before the error is returned.
pub async fn provision_ssa_vm<M, S>(
    mgmt: &M,
    connector: &S,
    data: &ResolvedProvisioning,
    config: &ProvisionConfig,
) -> Result<SsaVm, SmartStateError>
where
    M: ProviderMgmt + ?Sized,
    S: ShellConnector + ?Sized,
{
    let name = ssa_vm_name(&data.analysis_type);
    info!(vm = %name, image = %data.image, provider = mgmt.name(), "Provisioning VM");

    mgmt.create_vm(&VmRequest {
        name: name.clone(),
        image: data.image.clone(),
        data: data.data.clone(),
    })
    .await?;

    match bring_up(mgmt, connector, data, config, &name).await {
        Ok(vm) => Ok(vm),
        Err(err) => {
            warn!(vm = %name, error = %err, "Provisioning failed, deleting VM");
            if let Err(delete_err) = mgmt.delete_vm(&name).await {
                warn!(vm = %name, error = %delete_err, "Failed to delete VM");
            }
            Err(err)
        }
    }
}

async fn bring_up<M, S>(
    mgmt: &M,
    connector: &S,
    data: &ResolvedProvisioning,
    config: &ProvisionConfig,
    name: &str,
) -> Result<SsaVm, SmartStateError>
where
    M: ProviderMgmt + ?Sized,
    S: ShellConnector + ?Sized,
{
    if let Some(network) = &data.public_network {
        mgmt.assign_floating_ip(name, network).await?;
    }

    info!(vm = name, "VM provisioned, waiting for IP address to be assigned");
    let connect_ip = wait_for_ip(
        mgmt,
        name,
        &WaitOptions::new(config.ip_delay, config.ip_timeout),
    )
    .await?;

    let target = Target::vm(name, mgmt.name());

    let credentials = match &data.credentials {
        Some(credentials) if !data.is_windows_fs() => credentials,
        _ => {
            info!(vm = name, ip = %connect_ip, "Windows guest, no shell");
            return Ok(SsaVm {
                target,
                analysis_type: data.analysis_type.clone(),
                connect_ip,
                system_type: SystemType::Windows,
                shell: None,
            });
        }
    };

    let shell = connector.connect(&connect_ip, credentials).await?;
    let ready = async {
        let uptime = wait_for_shell(
            shell.as_ref(),
            name,
            &WaitOptions::new(config.ssh_delay, config.ssh_timeout),
        )
        .await?;
        let system_type = detect_guest_system(shell.as_ref()).await?;
        Ok::<_, SmartStateError>((uptime, system_type))
    }
    .await;

    let (uptime, system_type) = match ready {
        Ok(ready) => ready,
        Err(err) => {
            if let Err(close_err) = shell.close().await {
                warn!(vm = name, error = %close_err, "Failed to close shell");
            }
            return Err(err);
        }
    };
    info!(
        vm = name,
        ip = %connect_ip,
        system = %system_type,
        uptime_secs = uptime.as_secs(),
        "Guest ready"
    );

    Ok(SsaVm {
        target,
        analysis_type: data.analysis_type.clone(),
        connect_ip,
        system_type,
        shell: Some(shell),
    })
}

/// Server roles SmartState Analysis needs.
pub const SSA_SERVER_ROLES: &[&str] = &["automate", "smartproxy", "smartstate"];

/// Prepare the appliance to analyse guests of a provider: VDDK and host
/// credentials for VMware, and the SmartState server roles.
pub async fn prepare_provider<C>(
    control: &C,
    kind: ProviderKind,
    hosts: &[HostCredentials],
) -> Result<(), SmartStateError>
where
    C: ControlApi + ?Sized,
{
    if kind == ProviderKind::Virtualcenter {
        control.install_vddk().await?;
        for host in hosts {
            info!(host = %host.name, "Setting host credentials");
            control.set_host_credentials(host).await?;
        }
    }
    control.enable_server_roles(SSA_SERVER_ROLES).await?;
    Ok(())
}

/// Undo the host credentials set by [`prepare_provider`].
pub async fn reset_provider<C>(
    control: &C,
    kind: ProviderKind,
    hosts: &[HostCredentials],
) -> Result<(), SmartStateError>
where
    C: ControlApi + ?Sized,
{
    if kind == ProviderKind::Virtualcenter {
        for host in hosts {
            control.reset_host_credentials(&host.name).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::mock::{GuestConnector, MockGuest, MockProvider};

    fn resolved(fs_type: &str, kind: ProviderKind) -> ResolvedProvisioning {
        ResolvedProvisioning {
            provider_key: "p".to_string(),
            provider_name: "prov".to_string(),
            kind,
            analysis_type: "rhel7".to_string(),
            image: "rhel7-ssa".to_string(),
            credentials: Some(GuestCredentials {
                username: "root".to_string(),
                password: None,
            }),
            public_network: (kind == ProviderKind::Openstack).then(|| "public".to_string()),
            data: ProvisioningData {
                fs_type: Some(fs_type.to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn vm_names_carry_the_analysis_type() {
        let name = ssa_vm_name("rhel7");
        assert!(name.starts_with("test-ssa-"));
        assert!(name.ends_with("-rhel7"));
        assert_eq!(name.len(), "test-ssa-".len() + 8 + "-rhel7".len());
    }

    #[tokio::test(start_paused = true)]
    async fn provisions_unix_guest() {
        ssa_testing::init_tracing();
        let mgmt = MockProvider::new("prov", ProviderKind::Virtualcenter)
            .with_guest_image("rhel7-ssa", MockGuest::rhel())
            .with_ip_after(3)
            .boots_stopped();
        let connector = GuestConnector::new(&mgmt).with_failed_connects(2);

        let vm = provision_ssa_vm(
            &mgmt,
            &connector,
            &resolved("xfs", ProviderKind::Virtualcenter),
            &ProvisionConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(vm.system_type.flavor().map(|f| f.key), Some("rhel"));
        assert!(vm.shell.is_some());
        assert_eq!(mgmt.starts(vm.name()), 1);
        assert_eq!(vm.target.provider, "prov");

        let name = vm.name().to_string();
        vm.cleanup(&mgmt).await.unwrap();
        assert!(!mgmt.exists(&name));
    }

    #[tokio::test(start_paused = true)]
    async fn windows_guest_gets_no_shell() {
        let mgmt = MockProvider::new("prov", ProviderKind::Virtualcenter)
            .with_guest_image("rhel7-ssa", MockGuest::windows());
        let connector = GuestConnector::new(&mgmt);

        let vm = provision_ssa_vm(
            &mgmt,
            &connector,
            &resolved("ntfs", ProviderKind::Virtualcenter),
            &ProvisionConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(vm.system_type, SystemType::Windows);
        assert!(vm.shell.is_none());
        assert!(matches!(vm.shell(), Err(SmartStateError::NoShell(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn openstack_guest_gets_a_floating_ip() {
        let mgmt = MockProvider::new("osp", ProviderKind::Openstack)
            .with_guest_image("rhel7-ssa", MockGuest::fedora());
        let connector = GuestConnector::new(&mgmt);

        let vm = provision_ssa_vm(
            &mgmt,
            &connector,
            &resolved("xfs", ProviderKind::Openstack),
            &ProvisionConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(mgmt.floating_ip_network(vm.name()).as_deref(), Some("public"));
    }

    #[tokio::test(start_paused = true)]
    async fn vm_without_ip_times_out() {
        let mgmt = MockProvider::new("prov", ProviderKind::Rhevm)
            .with_guest_image("rhel7-ssa", MockGuest::rhel())
            .with_ip_after(u32::MAX);
        let connector = GuestConnector::new(&mgmt);
        let config = ProvisionConfig {
            ip_timeout: Duration::from_secs(60),
            ..Default::default()
        };

        let err = provision_ssa_vm(
            &mgmt,
            &connector,
            &resolved("xfs", ProviderKind::Rhevm),
            &config,
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("IP address of test-ssa-"));
        assert!(mgmt.vm_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_guest_is_deleted() {
        let mgmt = MockProvider::new("prov", ProviderKind::Rhevm)
            .with_guest_image("rhel7-ssa", MockGuest::rhel());
        let connector = GuestConnector::new(&mgmt).with_failed_connects(u32::MAX);
        let config = ProvisionConfig {
            ssh_timeout: Duration::from_secs(30),
            ..Default::default()
        };

        let err = provision_ssa_vm(
            &mgmt,
            &connector,
            &resolved("xfs", ProviderKind::Rhevm),
            &config,
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("SSH on test-ssa-"));
        assert!(mgmt.vm_names().is_empty());
    }

    #[tokio::test]
    async fn vmware_preparation_sets_hosts_and_roles() {
        let control = crate::mock::MockAppliance::new();
        let hosts = vec![HostCredentials {
            name: "esx-1".to_string(),
            principal: "root".to_string(),
            secret: None,
        }];

        prepare_provider(&control, ProviderKind::Virtualcenter, &hosts)
            .await
            .unwrap();
        assert!(control.vddk_installed());
        assert_eq!(control.host_credentials(), vec!["esx-1".to_string()]);
        assert_eq!(control.server_roles(), vec!["automate", "smartproxy", "smartstate"]);

        reset_provider(&control, ProviderKind::Virtualcenter, &hosts)
            .await
            .unwrap();
        assert!(control.host_credentials().is_empty());
    }
}
