//! Provider test data and run settings.
//!
//! Provider data is a TOML document with one table per provider:
//!
//! ```toml
//! [providers.vsphere67]
//! name = "vSphere 6.7"
//! type = "virtualcenter"
//!
//! [[providers.vsphere67.hosts]]
//! name = "esx-1.example.com"
//! principal = "root"
//! secret = "..."
//!
//! [providers.vsphere67.vm_analysis.provisioning]
//! host = "esx-1.example.com"
//! datastore = "datastore1"
//! vlan = "VM Network"
//!
//! [providers.vsphere67.vm_analysis.vms.rhel7]
//! image = "rhel7-ssa-template"
//! fs-type = "xfs"
//! username = "root"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drift::DriftConfig;
use crate::provision::{GuestCredentials, ProvisionConfig};
use crate::scan::ScanConfig;
use crate::system::WINDOWS_FS_TYPES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read provider data {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid provider data {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown provider {0:?}")]
    UnknownProvider(String),

    #[error("provider {provider} has no vm analysis data for {analysis_type:?}")]
    UnknownAnalysisType {
        provider: String,
        analysis_type: String,
    },

    #[error("provider {provider}: {field} is required for {analysis_type}")]
    MissingField {
        provider: String,
        analysis_type: String,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Virtualcenter,
    Rhevm,
    Scvmm,
    Openstack,
    Ec2,
    Azure,
    Gce,
}

impl ProviderKind {
    pub fn is_cloud(&self) -> bool {
        matches!(self, Self::Openstack | Self::Ec2 | Self::Azure | Self::Gce)
    }
}

/// Credentials of a hypervisor host, needed to scan VMware guests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCredentials {
    pub name: String,
    pub principal: String,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Provisioning parameters. Every field is optional so tables can be
/// layered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningData {
    pub image: Option<String>,
    #[serde(alias = "fs-type")]
    pub fs_type: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,

    // Infrastructure providers.
    pub host: Option<String>,
    pub datastore: Option<String>,
    pub vlan: Option<String>,
    pub cluster: Option<String>,

    // Cloud providers.
    pub instance_type: Option<String>,
    pub availability_zone: Option<String>,
    pub security_group: Option<String>,
    pub cloud_network: Option<String>,
}

fn overlay(base: &mut Option<String>, over: &Option<String>) {
    if over.is_some() {
        base.clone_from(over);
    }
}

impl ProvisioningData {
    /// Fields set in `over` replace the ones in `self`.
    pub fn overlay(mut self, over: &ProvisioningData) -> Self {
        overlay(&mut self.image, &over.image);
        overlay(&mut self.fs_type, &over.fs_type);
        overlay(&mut self.username, &over.username);
        overlay(&mut self.password, &over.password);
        overlay(&mut self.host, &over.host);
        overlay(&mut self.datastore, &over.datastore);
        overlay(&mut self.vlan, &over.vlan);
        overlay(&mut self.cluster, &over.cluster);
        overlay(&mut self.instance_type, &over.instance_type);
        overlay(&mut self.availability_zone, &over.availability_zone);
        overlay(&mut self.security_group, &over.security_group);
        overlay(&mut self.cloud_network, &over.cloud_network);
        self
    }

    pub fn is_windows_fs(&self) -> bool {
        self.fs_type
            .as_deref()
            .is_some_and(|fs| WINDOWS_FS_TYPES.contains(&fs.to_lowercase().as_str()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmAnalysisData {
    #[serde(default)]
    pub provisioning: ProvisioningData,

    /// Per analysis type overrides, keyed by analysis type.
    #[serde(default)]
    pub vms: BTreeMap<String, ProvisioningData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default)]
    pub default_cluster: Option<String>,
    #[serde(default)]
    pub public_network: Option<String>,
    #[serde(default)]
    pub provisioning: ProvisioningData,
    #[serde(default)]
    pub hosts: Vec<HostCredentials>,
    #[serde(default, alias = "vm_analysis_new")]
    pub vm_analysis: Option<VmAnalysisData>,
}

/// One provider x analysis type combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixEntry {
    pub provider: String,
    pub analysis_type: String,
    pub id: String,
}

/// Provisioning data resolved for one matrix entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvisioning {
    pub provider_key: String,
    pub provider_name: String,
    pub kind: ProviderKind,
    pub analysis_type: String,
    pub image: String,
    pub credentials: Option<GuestCredentials>,
    pub public_network: Option<String>,
    pub data: ProvisioningData,
}

impl ResolvedProvisioning {
    pub fn is_windows_fs(&self) -> bool {
        self.data.is_windows_fs()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderData {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderEntry>,
}

impl ProviderData {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parse `text`; `path` is only used in errors.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn provider(&self, key: &str) -> Result<&ProviderEntry, ConfigError> {
        self.providers
            .get(key)
            .ok_or_else(|| ConfigError::UnknownProvider(key.to_string()))
    }

    /// Every provider with vm analysis data, crossed with its analysis types.
    pub fn test_matrix(&self) -> Vec<MatrixEntry> {
        self.providers
            .iter()
            .filter_map(|(key, entry)| entry.vm_analysis.as_ref().map(|va| (key, va)))
            .flat_map(|(key, va)| {
                va.vms.keys().map(move |analysis_type| MatrixEntry {
                    provider: key.clone(),
                    analysis_type: analysis_type.clone(),
                    id: format!("{key}-{analysis_type}"),
                })
            })
            .collect()
    }

    /// Layer the provider's vm analysis defaults and the analysis type's
    /// overrides.
    ///
    /// On RHV the cluster comes from the vm analysis data, else the
    /// provider's own provisioning table, else its default cluster.
    pub fn provisioning_data(
        &self,
        provider_key: &str,
        analysis_type: &str,
    ) -> Result<ResolvedProvisioning, ConfigError> {
        let entry = self.provider(provider_key)?;
        let unknown = || ConfigError::UnknownAnalysisType {
            provider: provider_key.to_string(),
            analysis_type: analysis_type.to_string(),
        };
        let va = entry.vm_analysis.as_ref().ok_or_else(unknown)?;
        let vm = va.vms.get(analysis_type).ok_or_else(unknown)?;

        let mut data = va.provisioning.clone();
        if entry.kind == ProviderKind::Rhevm && data.cluster.is_none() {
            data.cluster = entry
                .provisioning
                .cluster
                .clone()
                .or_else(|| entry.default_cluster.clone());
        }
        let data = data.overlay(vm);

        let missing = |field| ConfigError::MissingField {
            provider: provider_key.to_string(),
            analysis_type: analysis_type.to_string(),
            field,
        };
        let image = data.image.clone().ok_or_else(|| missing("image"))?;
        let credentials = if data.is_windows_fs() {
            None
        } else {
            Some(GuestCredentials {
                username: data.username.clone().ok_or_else(|| missing("username"))?,
                password: data.password.clone(),
            })
        };
        let public_network = match entry.kind {
            ProviderKind::Openstack => {
                Some(entry.public_network.clone().ok_or_else(|| missing("public_network"))?)
            }
            _ => None,
        };

        Ok(ResolvedProvisioning {
            provider_key: provider_key.to_string(),
            provider_name: entry.name.clone(),
            kind: entry.kind,
            analysis_type: analysis_type.to_string(),
            image,
            credentials,
            public_network,
            data,
        })
    }
}

/// Run settings from the environment.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Provider data document from `SSA_PROVIDER_DATA`, if set.
    pub provider_data: Option<PathBuf>,

    /// Default log filter.
    pub log_level: String,

    pub scan: ScanConfig,
    pub drift: DriftConfig,
    pub provision: ProvisionConfig,
}

impl SuiteConfig {
    /// Load from `SSA_PROVIDER_DATA`, `SSA_LOG_LEVEL` and the scan
    /// settings (see [`ScanConfig::from_env`]).
    pub fn from_env() -> anyhow::Result<Self> {
        let provider_data = std::env::var_os("SSA_PROVIDER_DATA")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let log_level = std::env::var("SSA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let scan = ScanConfig::from_env().context("Invalid scan settings")?;

        Ok(Self {
            provider_data,
            log_level,
            scan,
            drift: DriftConfig::default(),
            provision: ProvisionConfig::default(),
        })
    }

    /// The provider data document, `fallback` when `SSA_PROVIDER_DATA` is
    /// unset.
    pub fn provider_data_path(&self, fallback: &Path) -> PathBuf {
        self.provider_data
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }

    pub fn load_provider_data(&self, fallback: &Path) -> Result<ProviderData, ConfigError> {
        ProviderData::load(&self.provider_data_path(fallback))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    const DATA: &str = r#"
[providers.vsphere67]
name = "vSphere 6.7"
type = "virtualcenter"

[[providers.vsphere67.hosts]]
name = "esx-1"
principal = "root"
secret = "hunter2"

[providers.vsphere67.vm_analysis.provisioning]
host = "esx-1"
datastore = "datastore1"
vlan = "VM Network"
username = "root"
password = "changeme"

[providers.vsphere67.vm_analysis.vms.rhel7]
image = "rhel7-ssa"
fs-type = "xfs"

[providers.vsphere67.vm_analysis.vms.ntfs]
image = "win2012-ssa"
fs-type = "ntfs"
datastore = "datastore2"

[providers.rhv42]
name = "RHV 4.2"
type = "rhevm"
default_cluster = "Default"

[providers.rhv42.vm_analysis_new.vms.centos]
image = "centos7-ssa"
username = "root"

[providers.osp13]
name = "OSP 13"
type = "openstack"
public_network = "public"

[providers.osp13.vm_analysis.provisioning]
instance_type = "m1.small"
username = "cloud-user"

[providers.osp13.vm_analysis.vms.fedora]
image = "fedora-ssa"

[providers.plain]
name = "No analysis"
type = "ec2"
"#;

    fn data() -> ProviderData {
        ProviderData::parse(DATA, Path::new("inline.toml")).unwrap()
    }

    #[test]
    fn matrix_ids_cross_provider_and_analysis_type() {
        let ids: Vec<_> = data().test_matrix().into_iter().map(|e| e.id).collect();
        assert_eq!(
            ids,
            vec!["osp13-fedora", "rhv42-centos", "vsphere67-ntfs", "vsphere67-rhel7"]
        );
    }

    #[test]
    fn analysis_type_overrides_defaults() {
        let resolved = data().provisioning_data("vsphere67", "ntfs").unwrap();
        assert_eq!(resolved.image, "win2012-ssa");
        assert_eq!(resolved.data.datastore.as_deref(), Some("datastore2"));
        assert_eq!(resolved.data.host.as_deref(), Some("esx-1"));
        assert!(resolved.is_windows_fs());
        assert_eq!(resolved.credentials, None);
    }

    #[test]
    fn unix_guest_carries_credentials() {
        let resolved = data().provisioning_data("vsphere67", "rhel7").unwrap();
        assert_eq!(
            resolved.credentials,
            Some(GuestCredentials {
                username: "root".to_string(),
                password: Some("changeme".to_string()),
            })
        );
        assert_eq!(resolved.kind, ProviderKind::Virtualcenter);
    }

    #[test]
    fn rhv_falls_back_to_default_cluster() {
        let resolved = data().provisioning_data("rhv42", "centos").unwrap();
        assert_eq!(resolved.data.cluster.as_deref(), Some("Default"));
    }

    #[test]
    fn openstack_needs_public_network() {
        let resolved = data().provisioning_data("osp13", "fedora").unwrap();
        assert_eq!(resolved.public_network.as_deref(), Some("public"));
        assert_eq!(resolved.data.instance_type.as_deref(), Some("m1.small"));
    }

    #[test]
    fn lookup_errors() {
        let data = data();
        assert!(matches!(
            data.provisioning_data("nope", "rhel7"),
            Err(ConfigError::UnknownProvider(_))
        ));
        assert!(matches!(
            data.provisioning_data("plain", "rhel7"),
            Err(ConfigError::UnknownAnalysisType { .. })
        ));
        assert!(matches!(
            data.provisioning_data("vsphere67", "suse"),
            Err(ConfigError::UnknownAnalysisType { .. })
        ));
    }

    #[test]
    fn missing_image_is_reported() {
        let text = r#"
[providers.x]
name = "x"
type = "virtualcenter"
[providers.x.vm_analysis.vms.rhel7]
username = "root"
"#;
        let data = ProviderData::parse(text, Path::new("x.toml")).unwrap();
        let err = data.provisioning_data("x", "rhel7").unwrap_err();
        assert_eq!(err.to_string(), "provider x: image is required for rhel7");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DATA.as_bytes()).unwrap();
        let data = ProviderData::load(file.path()).unwrap();
        assert_eq!(data.provider("osp13").unwrap().name, "OSP 13");
        assert_eq!(data.provider("vsphere67").unwrap().hosts.len(), 1);
    }

    #[test]
    fn bad_toml_names_the_file() {
        let err = ProviderData::parse("providers = 3", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn suite_config_reads_the_environment() {
        let config = temp_env::with_vars(
            [
                ("SSA_PROVIDER_DATA", Some("/srv/ssa/providers.toml")),
                ("SSA_LOG_LEVEL", Some("debug")),
                ("SSA_SCAN_DELAY", Some("10s")),
                ("SSA_SCAN_TIMEOUT", Some("30m")),
            ],
            SuiteConfig::from_env,
        )
        .unwrap();

        assert_eq!(
            config.provider_data_path(Path::new("unused.toml")),
            PathBuf::from("/srv/ssa/providers.toml")
        );
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.scan.delay, Duration::from_secs(10));
        assert_eq!(config.scan.timeout, Duration::from_secs(30 * 60));
        assert_eq!(config.drift, DriftConfig::default());
    }

    #[test]
    fn suite_config_defaults() {
        let config = temp_env::with_vars_unset(
            [
                "SSA_PROVIDER_DATA",
                "SSA_LOG_LEVEL",
                "SSA_SCAN_DELAY",
                "SSA_SCAN_TIMEOUT",
            ],
            SuiteConfig::from_env,
        )
        .unwrap();

        assert!(config.provider_data.is_none());
        assert_eq!(
            config.provider_data_path(Path::new("conf/providers.toml")),
            PathBuf::from("conf/providers.toml")
        );
        assert_eq!(config.log_level, "info");
        assert_eq!(config.scan, ScanConfig::default());
    }

    #[test]
    fn malformed_scan_timeout_is_rejected() {
        let err = temp_env::with_vars(
            [("SSA_SCAN_TIMEOUT", Some("soon")), ("SSA_SCAN_DELAY", None)],
            SuiteConfig::from_env,
        )
        .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("Invalid scan settings"));
        assert!(message.contains("SSA_SCAN_TIMEOUT"));
    }

    #[test]
    fn provider_data_loads_from_the_configured_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DATA.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = temp_env::with_var("SSA_PROVIDER_DATA", Some(path), SuiteConfig::from_env)
            .unwrap();
        let data = config.load_provider_data(Path::new("missing.toml")).unwrap();
        assert_eq!(data.test_matrix().len(), 4);
    }
}
