//! The product under test, as the checks see it.
//!
//! Two seams: [`Appliance`] reads and drives a VM's SmartState data, and
//! [`ControlApi`] configures the appliance (roles, policies, schedules).
//! Implementations wrap whatever automation reaches the product; an
//! in-process one lives in [`crate::mock`].

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::HostCredentials;
use crate::drift::{DriftFilter, Tag};
use crate::policy::{AnalysisProfile, ControlPolicy, PolicyAction, PolicyProfile, PolicyTarget};
use crate::schedule::ScheduleRequest;
use crate::SummaryField;

/// Kind of scanned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetKind {
    Vm,
    Template,
}

/// A VM or template known to the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    pub name: String,
    pub provider: String,
    pub kind: TargetKind,
}

impl Target {
    pub fn vm(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            kind: TargetKind::Vm,
        }
    }

    pub fn template(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            kind: TargetKind::Template,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TargetKind::Vm => "vm",
            TargetKind::Template => "template",
        };
        write!(f, "{kind} {} on {}", self.name, self.provider)
    }
}

/// SmartState data and actions for VMs and templates.
#[async_trait]
pub trait Appliance: Send + Sync {
    /// Queue a SmartState Analysis of `target`.
    async fn start_smartstate_scan(&self, target: &Target) -> Result<()>;

    /// True once the analysis task for `target_name` has finished.
    async fn is_analysis_finished(&self, target_name: &str) -> Result<bool>;

    /// Reload the tasks view.
    async fn reload_tasks(&self) -> Result<()>;

    /// Text of a summary entry.
    async fn summary_text(&self, target: &Target, field: SummaryField) -> Result<String>;

    /// Reload the details page.
    async fn reload_details(&self, target: &Target) -> Result<()>;

    /// OS type shown on the quadicon.
    async fn quadicon_os(&self, target: &Target) -> Result<String>;

    /// `Last Analyzed` text, `"Never"` before the first scan.
    async fn last_analyzed(&self, target: &Target) -> Result<String>;

    /// Names listed in the details table behind a summary entry.
    async fn detail_rows(&self, target: &Target, field: SummaryField) -> Result<Vec<String>>;

    async fn add_tag(&self, target: &Target, tag: &Tag) -> Result<()>;

    async fn remove_tag(&self, target: &Target, tag: &Tag) -> Result<()>;

    /// True if drift entries `first` and `second` agree on `row` of `section`.
    async fn equal_drift_results(
        &self,
        target: &Target,
        row: &str,
        section: &str,
        first: usize,
        second: usize,
    ) -> Result<bool>;

    /// True if `attribute` is listed in the drift view under `filter`.
    async fn drift_attribute_visible(
        &self,
        target: &Target,
        filter: DriftFilter,
        attribute: &str,
    ) -> Result<bool>;
}

/// Appliance configuration.
#[async_trait]
pub trait ControlApi: Send + Sync {
    async fn enable_server_roles(&self, roles: &[&str]) -> Result<()>;

    /// Install the VMware VDDK, needed to scan VMware guests.
    async fn install_vddk(&self) -> Result<()>;

    async fn set_host_credentials(&self, host: &HostCredentials) -> Result<()>;

    async fn reset_host_credentials(&self, host_name: &str) -> Result<()>;

    /// Make the appliance's own server the SmartProxy for `vm_name`.
    async fn set_server_relationship(&self, vm_name: &str) -> Result<()>;

    async fn create_analysis_profile(&self, profile: &AnalysisProfile) -> Result<()>;

    async fn delete_analysis_profile(&self, name: &str) -> Result<()>;

    async fn create_action(&self, action: &PolicyAction) -> Result<()>;

    async fn delete_action(&self, name: &str) -> Result<()>;

    async fn create_control_policy(&self, policy: &ControlPolicy) -> Result<()>;

    async fn delete_control_policy(&self, name: &str) -> Result<()>;

    async fn create_policy_profile(&self, profile: &PolicyProfile) -> Result<()>;

    async fn delete_policy_profile(&self, name: &str) -> Result<()>;

    async fn assign_policy_profile(&self, target: &PolicyTarget, profile: &str) -> Result<()>;

    async fn unassign_policy_profile(&self, target: &PolicyTarget, profile: &str) -> Result<()>;

    async fn create_schedule(&self, request: &ScheduleRequest) -> Result<()>;

    async fn delete_schedule(&self, name: &str) -> Result<()>;
}
