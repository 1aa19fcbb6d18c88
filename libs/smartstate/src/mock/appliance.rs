use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::guest::{GuestState, MockGuest};
use super::lock;
use crate::appliance::{Appliance, ControlApi, Target};
use crate::config::HostCredentials;
use crate::drift::{DriftFilter, Tag, COMPANY_TAGS_SECTION};
use crate::policy::{
    AnalysisProfile, ControlPolicy, PolicyAction, PolicyProfile, PolicyTarget,
    INITIATE_SMARTSTATE_ANALYSIS, VM_ANALYSIS_START, VM_PROVISION_COMPLETE,
};
use crate::schedule::{ScheduleRequest, FILTER_SINGLE_VM};
use crate::SummaryField;

#[derive(Debug)]
struct Task {
    polls_left: u32,
    finished: bool,
}

#[derive(Debug)]
struct ScanResult {
    state: GuestState,
    files: Vec<String>,
}

#[derive(Debug)]
struct Registered {
    target: Target,
    guest: MockGuest,
    tags: Vec<Tag>,
    task: Option<Task>,
    scan: Option<ScanResult>,
    /// Tags at each scan, newest first.
    drift: Vec<Vec<Tag>>,
    /// Drift entries the details page showed at its last reload.
    drift_shown: usize,
    last_analyzed: Option<String>,
}

#[derive(Debug, Default)]
struct ApplianceState {
    targets: BTreeMap<String, Registered>,
    analysis_polls: u32,
    record_drift: bool,
    fail_assignments: bool,
    task_reloads: u32,
    detail_reloads: u32,

    server_roles: BTreeSet<String>,
    vddk: bool,
    host_credentials: BTreeSet<String>,
    server_relationships: BTreeSet<String>,

    analysis_profiles: BTreeMap<String, AnalysisProfile>,
    actions: BTreeMap<String, PolicyAction>,
    policies: BTreeMap<String, ControlPolicy>,
    policy_profiles: BTreeMap<String, PolicyProfile>,
    assignments: HashMap<PolicyTarget, Vec<String>>,
    schedules: BTreeMap<String, ScheduleRequest>,
}

impl ApplianceState {
    fn registered(&self, name: &str) -> Result<&Registered> {
        self.targets
            .get(name)
            .with_context(|| format!("{name} is not known to the appliance"))
    }

    fn registered_mut(&mut self, name: &str) -> Result<&mut Registered> {
        self.targets
            .get_mut(name)
            .with_context(|| format!("{name} is not known to the appliance"))
    }

    /// Actions fired by `event` for `vm_name`, through policy profiles
    /// assigned to the VM or its provider.
    fn actions_on(&self, vm_name: &str, event: &str) -> Vec<String> {
        let mut targets = vec![PolicyTarget::Vm(vm_name.to_string())];
        if let Some(registered) = self.targets.get(vm_name) {
            targets.push(PolicyTarget::Provider(registered.target.provider.clone()));
        }

        targets
            .iter()
            .filter_map(|t| self.assignments.get(t))
            .flatten()
            .filter_map(|profile| self.policy_profiles.get(profile))
            .flat_map(|profile| &profile.policies)
            .filter_map(|policy| self.policies.get(policy))
            .flat_map(|policy| policy.actions_for(event).map(str::to_string))
            .collect()
    }

    fn analysis_profile_for(&self, vm_name: &str) -> Option<&AnalysisProfile> {
        self.actions_on(vm_name, VM_ANALYSIS_START)
            .iter()
            .filter_map(|action| self.actions.get(action))
            .find_map(|action| action.analysis_profile.as_ref())
            .and_then(|profile| self.analysis_profiles.get(profile))
    }

    fn start_task(&mut self, name: &str) -> Result<()> {
        let polls = self.analysis_polls;
        let registered = self.registered_mut(name)?;
        registered.task = Some(Task {
            polls_left: polls,
            finished: false,
        });
        info!(target = %registered.target, "[MOCK] Analysis queued");
        Ok(())
    }

    fn finish_scan(&mut self, name: &str) -> Result<()> {
        let collected: Vec<String> = self
            .analysis_profile_for(name)
            .map(|p| p.files.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();
        let record_drift = self.record_drift;

        let registered = self.registered_mut(name)?;
        let state = registered.guest.snapshot();
        let files = collected
            .into_iter()
            .filter(|f| state.files.contains(f))
            .collect();
        registered.scan = Some(ScanResult { state, files });
        if record_drift {
            registered.drift.insert(0, registered.tags.clone());
        }
        registered.last_analyzed = Some(Utc::now().format("%m/%d/%y %H:%M:%S UTC").to_string());
        info!(target = %registered.target, "[MOCK] Analysis finished");
        Ok(())
    }
}

/// The category part of a drift row such as `Department (1)`.
fn row_category(row: &str) -> &str {
    match row.rfind(" (") {
        Some(i) if row.ends_with(')') => &row[..i],
        _ => row,
    }
}

fn category_values(tags: &[Tag], category: &str) -> Vec<String> {
    let mut values: Vec<String> = tags
        .iter()
        .filter(|t| t.category == category)
        .map(|t| t.display_name.clone())
        .collect();
    values.sort();
    values
}

/// An appliance that scans [`MockGuest`]s.
///
/// Analyses finish after a configurable number of status polls and snapshot
/// the guest at that moment.
#[derive(Debug)]
pub struct MockAppliance {
    state: Mutex<ApplianceState>,
}

impl Default for MockAppliance {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAppliance {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ApplianceState {
                analysis_polls: 1,
                record_drift: true,
                ..Default::default()
            }),
        }
    }

    /// Report an analysis unfinished for `polls` status checks.
    pub fn with_analysis_polls(self, polls: u32) -> Self {
        lock(&self.state).analysis_polls = polls;
        self
    }

    /// Whether scans add drift history entries.
    pub fn with_drift_recording(self, record: bool) -> Self {
        lock(&self.state).record_drift = record;
        self
    }

    /// Reject every policy profile assignment.
    pub fn with_failing_assignments(self) -> Self {
        lock(&self.state).fail_assignments = true;
        self
    }

    /// Make `target` known, backed by `guest`.
    pub fn register(&self, target: &Target, guest: MockGuest) {
        lock(&self.state).targets.insert(
            target.name.clone(),
            Registered {
                target: target.clone(),
                guest,
                tags: Vec::new(),
                task: None,
                scan: None,
                drift: Vec::new(),
                drift_shown: 0,
                last_analyzed: None,
            },
        );
    }

    /// Fire `VM Provision Complete` for `target`.
    pub fn provision_complete(&self, target: &Target) -> Result<()> {
        let mut state = lock(&self.state);
        let actions = state.actions_on(&target.name, VM_PROVISION_COMPLETE);
        if actions.iter().any(|a| a == INITIATE_SMARTSTATE_ANALYSIS) {
            state.start_task(&target.name)?;
        }
        Ok(())
    }

    pub fn task_reloads(&self) -> u32 {
        lock(&self.state).task_reloads
    }

    pub fn detail_reloads(&self) -> u32 {
        lock(&self.state).detail_reloads
    }

    pub fn tags(&self, target: &Target) -> Vec<Tag> {
        lock(&self.state)
            .targets
            .get(&target.name)
            .map(|r| r.tags.clone())
            .unwrap_or_default()
    }

    pub fn assigned_profiles(&self, target: &PolicyTarget) -> Vec<String> {
        lock(&self.state)
            .assignments
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Analysis profile a scan of `vm_name` would use.
    pub fn analysis_profile_for(&self, vm_name: &str) -> Option<AnalysisProfile> {
        lock(&self.state).analysis_profile_for(vm_name).cloned()
    }

    /// Policy objects and assignments still present.
    pub fn policy_object_count(&self) -> usize {
        let state = lock(&self.state);
        state.analysis_profiles.len()
            + state.actions.len()
            + state.policies.len()
            + state.policy_profiles.len()
            + state.assignments.values().map(Vec::len).sum::<usize>()
    }

    pub fn schedules(&self) -> Vec<String> {
        lock(&self.state).schedules.keys().cloned().collect()
    }

    pub fn vddk_installed(&self) -> bool {
        lock(&self.state).vddk
    }

    pub fn host_credentials(&self) -> Vec<String> {
        lock(&self.state).host_credentials.iter().cloned().collect()
    }

    pub fn server_roles(&self) -> Vec<String> {
        lock(&self.state).server_roles.iter().cloned().collect()
    }

    pub fn server_relationships(&self) -> Vec<String> {
        lock(&self.state)
            .server_relationships
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Appliance for MockAppliance {
    async fn start_smartstate_scan(&self, target: &Target) -> Result<()> {
        lock(&self.state).start_task(&target.name)
    }

    async fn is_analysis_finished(&self, target_name: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        let registered = state.registered_mut(target_name)?;
        let Some(task) = registered.task.as_mut() else {
            return Ok(false);
        };
        if task.finished {
            return Ok(true);
        }
        if task.polls_left > 0 {
            task.polls_left -= 1;
            return Ok(false);
        }
        task.finished = true;
        state.finish_scan(target_name)?;
        Ok(true)
    }

    async fn reload_tasks(&self) -> Result<()> {
        lock(&self.state).task_reloads += 1;
        Ok(())
    }

    async fn summary_text(&self, target: &Target, field: SummaryField) -> Result<String> {
        let state = lock(&self.state);
        let registered = state.registered(&target.name)?;

        if field == SummaryField::DriftHistory {
            return Ok(match registered.drift_shown {
                0 => "None".to_string(),
                n => n.to_string(),
            });
        }

        let Some(scan) = &registered.scan else {
            return Ok(match field {
                SummaryField::OperatingSystem => "Unknown".to_string(),
                _ => "0".to_string(),
            });
        };
        let guest = &scan.state;
        let windows_count = if guest.system.is_windows() {
            guest.windows_count
        } else {
            0
        };

        Ok(match field {
            SummaryField::OperatingSystem => guest.os_name.clone(),
            SummaryField::Users => guest.users.len().to_string(),
            SummaryField::Groups => guest.groups.len().to_string(),
            SummaryField::Packages => guest.packages.len().to_string(),
            SummaryField::InitProcesses => guest.services.to_string(),
            SummaryField::Files => scan.files.len().to_string(),
            SummaryField::Patches
            | SummaryField::Applications
            | SummaryField::Win32Services
            | SummaryField::KernelDrivers
            | SummaryField::FileSystemDrivers => windows_count.to_string(),
            SummaryField::DriftHistory => registered.drift_shown.to_string(),
        })
    }

    async fn reload_details(&self, target: &Target) -> Result<()> {
        let mut state = lock(&self.state);
        state.detail_reloads += 1;
        let registered = state.registered_mut(&target.name)?;
        registered.drift_shown = registered.drift.len();
        Ok(())
    }

    async fn quadicon_os(&self, target: &Target) -> Result<String> {
        let state = lock(&self.state);
        Ok(state
            .registered(&target.name)?
            .scan
            .as_ref()
            .map_or("unknown", |scan| scan.state.system.os_type())
            .to_string())
    }

    async fn last_analyzed(&self, target: &Target) -> Result<String> {
        let state = lock(&self.state);
        Ok(state
            .registered(&target.name)?
            .last_analyzed
            .clone()
            .unwrap_or_else(|| "Never".to_string()))
    }

    async fn detail_rows(&self, target: &Target, field: SummaryField) -> Result<Vec<String>> {
        let state = lock(&self.state);
        let Some(scan) = &state.registered(&target.name)?.scan else {
            return Ok(Vec::new());
        };
        Ok(match field {
            SummaryField::Users => scan.state.users.clone(),
            SummaryField::Groups => scan.state.groups.clone(),
            SummaryField::Packages => scan.state.packages.clone(),
            SummaryField::Files => scan.files.clone(),
            _ => Vec::new(),
        })
    }

    async fn add_tag(&self, target: &Target, tag: &Tag) -> Result<()> {
        let mut state = lock(&self.state);
        let registered = state.registered_mut(&target.name)?;
        if !registered.tags.contains(tag) {
            registered.tags.push(tag.clone());
        }
        info!(target = %target, tag = %tag, "[MOCK] Tagged");
        Ok(())
    }

    async fn remove_tag(&self, target: &Target, tag: &Tag) -> Result<()> {
        let mut state = lock(&self.state);
        let registered = state.registered_mut(&target.name)?;
        let before = registered.tags.len();
        registered.tags.retain(|t| t != tag);
        if registered.tags.len() == before {
            bail!("{target} is not tagged {tag}");
        }
        info!(target = %target, tag = %tag, "[MOCK] Untagged");
        Ok(())
    }

    async fn equal_drift_results(
        &self,
        target: &Target,
        row: &str,
        section: &str,
        first: usize,
        second: usize,
    ) -> Result<bool> {
        let state = lock(&self.state);
        let drift = &state.registered(&target.name)?.drift;
        let (Some(a), Some(b)) = (drift.get(first), drift.get(second)) else {
            bail!(
                "drift history of {} has {} entries, cannot compare {first} and {second}",
                target.name,
                drift.len()
            );
        };
        if section != COMPANY_TAGS_SECTION {
            // Only tags change between mock scans.
            return Ok(true);
        }
        let category = row_category(row);
        Ok(category_values(a, category) == category_values(b, category))
    }

    async fn drift_attribute_visible(
        &self,
        target: &Target,
        filter: DriftFilter,
        attribute: &str,
    ) -> Result<bool> {
        let state = lock(&self.state);
        let drift = &state.registered(&target.name)?.drift;
        let category = row_category(attribute);
        let differs = match (drift.first(), drift.get(1)) {
            (Some(a), Some(b)) => category_values(a, category) != category_values(b, category),
            _ => false,
        };
        Ok(match filter {
            DriftFilter::SameValues => !differs,
            DriftFilter::DifferentValues => differs,
        })
    }
}

#[async_trait]
impl ControlApi for MockAppliance {
    async fn enable_server_roles(&self, roles: &[&str]) -> Result<()> {
        let mut state = lock(&self.state);
        state
            .server_roles
            .extend(roles.iter().map(|r| r.to_string()));
        info!(?roles, "[MOCK] Server roles enabled");
        Ok(())
    }

    async fn install_vddk(&self) -> Result<()> {
        lock(&self.state).vddk = true;
        info!("[MOCK] VDDK installed");
        Ok(())
    }

    async fn set_host_credentials(&self, host: &HostCredentials) -> Result<()> {
        lock(&self.state).host_credentials.insert(host.name.clone());
        Ok(())
    }

    async fn reset_host_credentials(&self, host_name: &str) -> Result<()> {
        lock(&self.state).host_credentials.remove(host_name);
        Ok(())
    }

    async fn set_server_relationship(&self, vm_name: &str) -> Result<()> {
        lock(&self.state)
            .server_relationships
            .insert(vm_name.to_string());
        Ok(())
    }

    async fn create_analysis_profile(&self, profile: &AnalysisProfile) -> Result<()> {
        let mut state = lock(&self.state);
        if state.analysis_profiles.contains_key(&profile.name) {
            bail!("analysis profile {} already exists", profile.name);
        }
        state
            .analysis_profiles
            .insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    async fn delete_analysis_profile(&self, name: &str) -> Result<()> {
        lock(&self.state)
            .analysis_profiles
            .remove(name)
            .map(drop)
            .with_context(|| format!("analysis profile {name} not found"))
    }

    async fn create_action(&self, action: &PolicyAction) -> Result<()> {
        lock(&self.state)
            .actions
            .insert(action.name.clone(), action.clone());
        Ok(())
    }

    async fn delete_action(&self, name: &str) -> Result<()> {
        lock(&self.state)
            .actions
            .remove(name)
            .map(drop)
            .with_context(|| format!("action {name} not found"))
    }

    async fn create_control_policy(&self, policy: &ControlPolicy) -> Result<()> {
        lock(&self.state)
            .policies
            .insert(policy.name.clone(), policy.clone());
        Ok(())
    }

    async fn delete_control_policy(&self, name: &str) -> Result<()> {
        lock(&self.state)
            .policies
            .remove(name)
            .map(drop)
            .with_context(|| format!("policy {name} not found"))
    }

    async fn create_policy_profile(&self, profile: &PolicyProfile) -> Result<()> {
        lock(&self.state)
            .policy_profiles
            .insert(profile.description.clone(), profile.clone());
        Ok(())
    }

    async fn delete_policy_profile(&self, name: &str) -> Result<()> {
        lock(&self.state)
            .policy_profiles
            .remove(name)
            .map(drop)
            .with_context(|| format!("policy profile {name} not found"))
    }

    async fn assign_policy_profile(&self, target: &PolicyTarget, profile: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_assignments {
            bail!("policy profile assignment rejected");
        }
        if !state.policy_profiles.contains_key(profile) {
            bail!("policy profile {profile} not found");
        }
        let assigned = state.assignments.entry(target.clone()).or_default();
        if !assigned.iter().any(|p| p == profile) {
            assigned.push(profile.to_string());
        }
        info!(?target, profile, "[MOCK] Policy profile assigned");
        Ok(())
    }

    async fn unassign_policy_profile(&self, target: &PolicyTarget, profile: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let Some(assigned) = state.assignments.get_mut(target) else {
            bail!("no policy profiles assigned to {target:?}");
        };
        assigned.retain(|p| p != profile);
        if assigned.is_empty() {
            state.assignments.remove(target);
        }
        Ok(())
    }

    async fn create_schedule(&self, request: &ScheduleRequest) -> Result<()> {
        let mut state = lock(&self.state);
        state
            .schedules
            .insert(request.name.clone(), request.clone());
        info!(schedule = %request.name, "[MOCK] Schedule created");

        // Mock schedules fire as soon as they are created.
        if request.active && request.filter_level1 == FILTER_SINGLE_VM {
            state.start_task(&request.filter_level2)?;
        }
        Ok(())
    }

    async fn delete_schedule(&self, name: &str) -> Result<()> {
        lock(&self.state)
            .schedules
            .remove(name)
            .map(drop)
            .with_context(|| format!("schedule {name} not found"))
    }
}
