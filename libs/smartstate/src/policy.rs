//! Analysis profiles and control policies that drive SmartState scans.
//!
//! Two arrangements are used:
//!
//! - **Profiled VM**: on `VM Analysis Start`, assign the `default` analysis
//!   profile, so scans collect the expected files.
//! - **Compliance**: on `VM Provision Complete`, start an analysis of the new
//!   VM. Assigned to the provider, so every provisioned VM is scanned.

use serde::Serialize;
use ssa_testing::gen_alpha;
use tracing::{info, warn};

use crate::appliance::ControlApi;
use crate::SmartStateError;

pub const VM_ANALYSIS_START: &str = "VM Analysis Start";
pub const VM_PROVISION_COMPLETE: &str = "VM Provision Complete";
pub const ASSIGN_ANALYSIS_PROFILE: &str = "Assign Profile to Analysis Task";
pub const INITIATE_SMARTSTATE_ANALYSIS: &str = "Initiate SmartState Analysis for VM";

/// Files the `default` analysis profile collects.
pub const SSA_EXPECT_FILES: &[&str] = &[
    "/etc/hosts",
    "/etc/redhat-access-insights/machine-id",
    "/etc/passwd",
];

/// Analysis profile categories.
pub const SSA_CATEGORIES: &[&str] = &["System", "Software", "User Accounts", "VM Configuration"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProfileType {
    Vm,
    Host,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedFile {
    pub name: String,
    pub collect_contents: bool,
}

/// What a scan collects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisProfile {
    pub name: String,
    pub description: String,
    pub profile_type: ProfileType,
    pub categories: Vec<String>,
    pub files: Vec<CollectedFile>,
}

impl AnalysisProfile {
    /// The `default` VM profile: standard categories plus the expected files
    /// with their contents.
    pub fn default_vm() -> Self {
        Self {
            name: "default".to_string(),
            description: "default".to_string(),
            profile_type: ProfileType::Vm,
            categories: SSA_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            files: SSA_EXPECT_FILES
                .iter()
                .map(|f| CollectedFile {
                    name: f.to_string(),
                    collect_contents: true,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyAction {
    pub name: String,
    pub action_type: String,
    pub analysis_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventActions {
    pub event: String,
    pub actions: Vec<String>,
}

/// A VM control policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlPolicy {
    pub name: String,
    pub events: Vec<EventActions>,
}

impl ControlPolicy {
    pub fn on_event(name: impl Into<String>, event: &str, actions: Vec<String>) -> Self {
        Self {
            name: name.into(),
            events: vec![EventActions {
                event: event.to_string(),
                actions,
            }],
        }
    }

    /// Actions bound to `event`.
    pub fn actions_for<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.events
            .iter()
            .filter(move |e| e.event == event)
            .flat_map(|e| e.actions.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyProfile {
    pub description: String,
    pub policies: Vec<String>,
}

/// Object a policy profile is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PolicyTarget {
    Vm(String),
    Provider(String),
}

/// Policies making every analysis of one VM use the `default` profile.
#[derive(Debug, Clone)]
pub struct ProfiledVm {
    pub analysis_profile: AnalysisProfile,
    pub action: PolicyAction,
    pub policy: ControlPolicy,
    pub profile: PolicyProfile,
    pub target: PolicyTarget,
}

impl ProfiledVm {
    /// Create the profile, action, policy and policy profile, and assign
    /// the policy profile to `vm_name`.
    ///
    /// On failure the objects already created are deleted again.
    pub async fn setup<C>(control: &C, vm_name: &str) -> Result<Self, SmartStateError>
    where
        C: ControlApi + ?Sized,
    {
        let mut created = Vec::new();
        let result = Self::create(control, vm_name, &mut created).await;
        if result.is_err() {
            roll_back(control, created).await;
        }
        result
    }

    async fn create<C>(
        control: &C,
        vm_name: &str,
        created: &mut Vec<Created>,
    ) -> Result<Self, SmartStateError>
    where
        C: ControlApi + ?Sized,
    {
        let analysis_profile = AnalysisProfile::default_vm();
        control.create_analysis_profile(&analysis_profile).await?;
        created.push(Created::AnalysisProfile(analysis_profile.name.clone()));

        let action = PolicyAction {
            name: format!("ssa_action_{}", gen_alpha(8)),
            action_type: ASSIGN_ANALYSIS_PROFILE.to_string(),
            analysis_profile: Some(analysis_profile.name.clone()),
        };
        control.create_action(&action).await?;
        created.push(Created::Action(action.name.clone()));

        let policy = ControlPolicy::on_event(
            format!("ssa_policy_{}", gen_alpha(8)),
            VM_ANALYSIS_START,
            vec![action.name.clone()],
        );
        control.create_control_policy(&policy).await?;
        created.push(Created::Policy(policy.name.clone()));

        let profile = PolicyProfile {
            description: format!("ssa_policy_profile_{}", gen_alpha(8)),
            policies: vec![policy.name.clone()],
        };
        control.create_policy_profile(&profile).await?;
        created.push(Created::PolicyProfile(profile.description.clone()));

        let target = PolicyTarget::Vm(vm_name.to_string());
        control
            .assign_policy_profile(&target, &profile.description)
            .await?;

        info!(vm = vm_name, profile = %profile.description, "VM profiled for analysis");
        Ok(Self {
            analysis_profile,
            action,
            policy,
            profile,
            target,
        })
    }

    /// Undo [`ProfiledVm::setup`] in reverse order.
    ///
    /// Every step is attempted; the first failure is returned.
    pub async fn teardown<C>(&self, control: &C) -> Result<(), SmartStateError>
    where
        C: ControlApi + ?Sized,
    {
        let mut first_error = None;
        let mut note = |step: &str, result: anyhow::Result<()>| {
            if let Err(err) = result {
                warn!(step, error = %err, "Policy teardown step failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        };

        note(
            "unassign policy profile",
            control
                .unassign_policy_profile(&self.target, &self.profile.description)
                .await,
        );
        note(
            "delete policy profile",
            control.delete_policy_profile(&self.profile.description).await,
        );
        note(
            "delete policy",
            control.delete_control_policy(&self.policy.name).await,
        );
        note("delete action", control.delete_action(&self.action.name).await);
        note(
            "delete analysis profile",
            control
                .delete_analysis_profile(&self.analysis_profile.name)
                .await,
        );

        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Policy analysing every VM provisioned on a provider.
#[derive(Debug, Clone)]
pub struct ComplianceProfile {
    pub policy: ControlPolicy,
    pub profile: PolicyProfile,
    pub target: PolicyTarget,
}

impl ComplianceProfile {
    /// Create the policy and policy profile and assign it to `provider`.
    ///
    /// On failure the objects already created are deleted again.
    pub async fn setup<C>(control: &C, provider: &str) -> Result<Self, SmartStateError>
    where
        C: ControlApi + ?Sized,
    {
        let mut created = Vec::new();
        let result = Self::create(control, provider, &mut created).await;
        if result.is_err() {
            roll_back(control, created).await;
        }
        result
    }

    async fn create<C>(
        control: &C,
        provider: &str,
        created: &mut Vec<Created>,
    ) -> Result<Self, SmartStateError>
    where
        C: ControlApi + ?Sized,
    {
        let policy = ControlPolicy::on_event(
            format!("ssa_policy_{}", gen_alpha(8)),
            VM_PROVISION_COMPLETE,
            vec![INITIATE_SMARTSTATE_ANALYSIS.to_string()],
        );
        control.create_control_policy(&policy).await?;
        created.push(Created::Policy(policy.name.clone()));

        let profile = PolicyProfile {
            description: format!("ssa_policy_profile_{}", gen_alpha(8)),
            policies: vec![policy.name.clone()],
        };
        control.create_policy_profile(&profile).await?;
        created.push(Created::PolicyProfile(profile.description.clone()));

        let target = PolicyTarget::Provider(provider.to_string());
        control
            .assign_policy_profile(&target, &profile.description)
            .await?;

        info!(provider, profile = %profile.description, "Compliance policy assigned");
        Ok(Self {
            policy,
            profile,
            target,
        })
    }

    pub async fn teardown<C>(&self, control: &C) -> Result<(), SmartStateError>
    where
        C: ControlApi + ?Sized,
    {
        let unassigned = control
            .unassign_policy_profile(&self.target, &self.profile.description)
            .await;
        let profile_deleted = control
            .delete_policy_profile(&self.profile.description)
            .await;
        let policy_deleted = control.delete_control_policy(&self.policy.name).await;
        unassigned?;
        profile_deleted?;
        policy_deleted?;
        Ok(())
    }
}

/// A policy object created during a setup that has not finished yet.
#[derive(Debug)]
enum Created {
    AnalysisProfile(String),
    Action(String),
    Policy(String),
    PolicyProfile(String),
}

/// Delete `created`, newest first. Failures are logged and skipped.
async fn roll_back<C>(control: &C, created: Vec<Created>)
where
    C: ControlApi + ?Sized,
{
    for object in created.into_iter().rev() {
        let result = match &object {
            Created::AnalysisProfile(name) => control.delete_analysis_profile(name).await,
            Created::Action(name) => control.delete_action(name).await,
            Created::Policy(name) => control.delete_control_policy(name).await,
            Created::PolicyProfile(name) => control.delete_policy_profile(name).await,
        };
        if let Err(err) = result {
            warn!(?object, error = %err, "Failed to roll back policy object");
        }
    }
}
