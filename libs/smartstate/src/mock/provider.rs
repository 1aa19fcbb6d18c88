use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::guest::MockGuest;
use super::lock;
use crate::config::ProviderKind;
use crate::provision::{GuestCredentials, ProviderMgmt, ShellConnector, VmRequest};
use crate::shell::RemoteShell;

#[derive(Debug)]
struct MockVm {
    guest: MockGuest,
    running: bool,
    ip: String,
    ip_polls_left: u32,
    starts: u32,
    floating_network: Option<String>,
}

#[derive(Debug, Default)]
struct ProviderState {
    images: HashMap<String, MockGuest>,
    vms: BTreeMap<String, MockVm>,
    ip_after: u32,
    boots_stopped: bool,
    created: u32,
}

/// A provider whose VMs are [`MockGuest`] forks of registered images.
#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
    kind: ProviderKind,
    state: Arc<Mutex<ProviderState>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            state: Arc::default(),
        }
    }

    /// Make `image` available; VMs created from it start as copies of
    /// `guest`.
    pub fn with_guest_image(self, image: impl Into<String>, guest: MockGuest) -> Self {
        lock(&self.state).images.insert(image.into(), guest);
        self
    }

    /// Report no IP for the first `polls` lookups of a running VM.
    pub fn with_ip_after(self, polls: u32) -> Self {
        lock(&self.state).ip_after = polls;
        self
    }

    /// Create VMs powered off.
    pub fn boots_stopped(self) -> Self {
        lock(&self.state).boots_stopped = true;
        self
    }

    pub fn exists(&self, name: &str) -> bool {
        lock(&self.state).vms.contains_key(name)
    }

    /// Number of times `name` was powered on.
    pub fn starts(&self, name: &str) -> u32 {
        lock(&self.state).vms.get(name).map_or(0, |vm| vm.starts)
    }

    pub fn floating_ip_network(&self, name: &str) -> Option<String> {
        lock(&self.state)
            .vms
            .get(name)
            .and_then(|vm| vm.floating_network.clone())
    }

    /// The guest running as `name`.
    pub fn guest(&self, name: &str) -> Option<MockGuest> {
        lock(&self.state).vms.get(name).map(|vm| vm.guest.clone())
    }

    pub fn vm_names(&self) -> Vec<String> {
        lock(&self.state).vms.keys().cloned().collect()
    }

    fn guest_at(&self, ip: &str) -> Option<MockGuest> {
        lock(&self.state)
            .vms
            .values()
            .find(|vm| vm.ip == ip)
            .map(|vm| vm.guest.clone())
    }
}

fn vm_mut<'a>(state: &'a mut ProviderState, name: &str) -> Result<&'a mut MockVm> {
    state
        .vms
        .get_mut(name)
        .with_context(|| format!("VM {name} not found"))
}

#[async_trait]
impl ProviderMgmt for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn create_vm(&self, request: &VmRequest) -> Result<()> {
        let mut state = lock(&self.state);
        if state.vms.contains_key(&request.name) {
            bail!("VM {} already exists", request.name);
        }
        let Some(image) = state.images.get(&request.image) else {
            bail!("image {} not found on {}", request.image, self.name);
        };
        let guest = image.fork();

        state.created += 1;
        let vm = MockVm {
            guest,
            running: !state.boots_stopped,
            ip: format!("10.8.{}.{}", state.created / 250, state.created % 250 + 2),
            ip_polls_left: state.ip_after,
            starts: 0,
            floating_network: None,
        };
        info!(vm = %request.name, image = %request.image, "[MOCK] Created VM");
        state.vms.insert(request.name.clone(), vm);
        Ok(())
    }

    async fn vm_status(&self, name: &str) -> Result<String> {
        let mut state = lock(&self.state);
        let vm = vm_mut(&mut state, name)?;
        Ok(if vm.running { "running" } else { "stopped" }.to_string())
    }

    async fn is_vm_stopped(&self, name: &str) -> Result<bool> {
        let mut state = lock(&self.state);
        Ok(!vm_mut(&mut state, name)?.running)
    }

    async fn start_vm(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let vm = vm_mut(&mut state, name)?;
        vm.running = true;
        vm.starts += 1;
        info!(vm = name, "[MOCK] Started VM");
        Ok(())
    }

    async fn current_ip_address(&self, name: &str) -> Result<Option<String>> {
        let mut state = lock(&self.state);
        let vm = vm_mut(&mut state, name)?;
        if !vm.running {
            return Ok(None);
        }
        if vm.ip_polls_left > 0 {
            vm.ip_polls_left -= 1;
            return Ok(None);
        }
        Ok(Some(vm.ip.clone()))
    }

    async fn assign_floating_ip(&self, name: &str, network: &str) -> Result<()> {
        let mut state = lock(&self.state);
        vm_mut(&mut state, name)?.floating_network = Some(network.to_string());
        info!(vm = name, network, "[MOCK] Assigned floating IP");
        Ok(())
    }

    async fn delete_vm(&self, name: &str) -> Result<()> {
        if lock(&self.state).vms.remove(name).is_none() {
            bail!("VM {name} not found");
        }
        info!(vm = name, "[MOCK] Deleted VM");
        Ok(())
    }
}

/// Connects to the guests of a [`MockProvider`] by IP.
#[derive(Debug, Clone)]
pub struct GuestConnector {
    provider: MockProvider,
    failed_connects: u32,
}

impl GuestConnector {
    pub fn new(provider: &MockProvider) -> Self {
        Self {
            provider: provider.clone(),
            failed_connects: 0,
        }
    }

    /// Refuse the first `attempts` commands of every shell, as a guest
    /// still booting would.
    pub fn with_failed_connects(mut self, attempts: u32) -> Self {
        self.failed_connects = attempts;
        self
    }
}

#[async_trait]
impl ShellConnector for GuestConnector {
    async fn connect(
        &self,
        host: &str,
        credentials: &GuestCredentials,
    ) -> Result<Box<dyn RemoteShell>> {
        let Some(guest) = self.provider.guest_at(host) else {
            bail!("no route to host {host}");
        };
        info!(host, user = %credentials.username, "[MOCK] Connected");
        Ok(Box::new(guest.shell().unreachable_for(self.failed_connects)))
    }
}
