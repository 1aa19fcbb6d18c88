use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::lock;
use crate::facts::{GROUPS_COUNT_COMMAND, OS_RELEASE_COMMAND, USERS_COUNT_COMMAND};
use crate::shell::{CommandOutput, RemoteShell};
use crate::system::{flavor, SystemType, UnixFlavor};

/// Everything a scan or a shell can observe on a guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestState {
    pub system: SystemType,

    /// Operating system as the details page shows it.
    pub os_name: String,

    /// `/etc/os-release`; absent on Windows.
    pub os_release: Option<String>,

    pub users: Vec<String>,
    pub groups: Vec<String>,
    pub packages: Vec<String>,
    pub services: u32,
    pub files: Vec<String>,

    /// Value of each Windows-only count.
    pub windows_count: u32,

    pub uptime: Duration,
}

const BASE_USERS: &[&str] = &[
    "root", "bin", "daemon", "adm", "lp", "sync", "shutdown", "halt", "mail", "operator",
    "games", "ftp", "nobody", "dbus", "polkitd", "sshd", "postfix", "chrony", "cloud-user",
];

const BASE_FILES: &[&str] = &["/etc/hosts", "/etc/passwd", "/etc/group", "/etc/fstab"];

fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}{i}")).collect()
}

/// A simulated guest, shared between its shell, its provider and the
/// appliance scanning it.
#[derive(Debug, Clone)]
pub struct MockGuest {
    state: Arc<Mutex<GuestState>>,
}

impl MockGuest {
    pub fn new(state: GuestState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A Unix guest with a realistic spread of accounts and packages.
    pub fn unix(flavor: &'static UnixFlavor, os_name: &str, os_release: &str) -> Self {
        let mut packages = numbered("pkg-", 300);
        if flavor.install_command.is_none() {
            packages.push(flavor.package.to_string());
        }
        Self::new(GuestState {
            system: SystemType::Unix(flavor),
            os_name: os_name.to_string(),
            os_release: Some(os_release.to_string()),
            users: BASE_USERS.iter().map(|u| u.to_string()).collect(),
            groups: numbered("group", 38),
            packages,
            services: 187,
            files: BASE_FILES.iter().map(|f| f.to_string()).collect(),
            windows_count: 0,
            uptime: Duration::from_secs(120),
        })
    }

    fn known(key: &str, os_name: &str, os_release: &str) -> Self {
        match flavor(key) {
            Some(flavor) => Self::unix(flavor, os_name, os_release),
            None => Self::windows(),
        }
    }

    pub fn rhel() -> Self {
        let guest = Self::known(
            "rhel",
            "Red Hat Enterprise Linux Server 7.5 (Maipo)",
            "NAME=\"Red Hat Enterprise Linux Server\"\nVERSION=\"7.5 (Maipo)\"\nID=\"rhel\"\n",
        );
        guest.update(|s| s.files.push("/etc/redhat-access-insights/machine-id".to_string()));
        guest
    }

    pub fn centos() -> Self {
        Self::known(
            "centos",
            "CentOS Linux 7 (Core)",
            "NAME=\"CentOS Linux\"\nVERSION=\"7 (Core)\"\nID=\"centos\"\n",
        )
    }

    pub fn fedora() -> Self {
        Self::known(
            "fedora",
            "Fedora 28 (Server Edition)",
            "NAME=Fedora\nVERSION=\"28 (Server Edition)\"\nID=fedora\n",
        )
    }

    pub fn ubuntu() -> Self {
        Self::known(
            "ubuntu",
            "Ubuntu 14.04.5 LTS",
            "NAME=\"Ubuntu\"\nPRETTY_NAME=\"Ubuntu 14.04.5 LTS\"\nID=ubuntu\n",
        )
    }

    pub fn windows() -> Self {
        Self::new(GuestState {
            system: SystemType::Windows,
            os_name: "Microsoft Windows Server 2012 R2 Standard".to_string(),
            os_release: None,
            users: vec!["Administrator".to_string(), "Guest".to_string()],
            groups: numbered("Group", 24),
            packages: Vec::new(),
            services: 0,
            files: Vec::new(),
            windows_count: 42,
            uptime: Duration::from_secs(300),
        })
    }

    /// An independent copy, as a VM cloned from this image would be.
    pub fn fork(&self) -> Self {
        Self::new(self.snapshot())
    }

    pub fn snapshot(&self) -> GuestState {
        lock(&self.state).clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut GuestState)) {
        f(&mut lock(&self.state));
    }

    /// A shell on this guest.
    pub fn shell(&self) -> GuestShell {
        GuestShell {
            guest: self.clone(),
            unreachable_for: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        }
    }
}

fn toggle(list: &mut Vec<String>, name: &str) {
    match list.iter().position(|n| n == name) {
        Some(i) => {
            list.remove(i);
        }
        None => list.push(name.to_string()),
    }
}

fn count(n: usize) -> CommandOutput {
    CommandOutput::new(0, format!("{n}\n"))
}

fn execute(state: &mut GuestState, command: &str) -> CommandOutput {
    let not_found = || CommandOutput::new(127, format!("{command}: command not found\n"));
    let Some(flavor) = state.system.flavor() else {
        return not_found();
    };

    if command == OS_RELEASE_COMMAND {
        return CommandOutput::new(0, state.os_release.clone().unwrap_or_default());
    }
    if command == USERS_COUNT_COMMAND {
        return count(state.users.len());
    }
    if command == GROUPS_COUNT_COMMAND {
        return count(state.groups.len());
    }
    if command == flavor.package_count_command {
        return count(state.packages.len());
    }
    if command == flavor.service_count_command {
        return count(state.services as usize);
    }
    if command == "cat /proc/uptime" {
        let secs = state.uptime.as_secs_f64();
        return CommandOutput::new(0, format!("{secs:.2} {:.2}\n", secs * 4.0));
    }
    if flavor.install_package_command().as_deref() == Some(command) {
        if !state.packages.iter().any(|p| p == flavor.package) {
            state.packages.push(flavor.package.to_string());
        }
        return CommandOutput::new(0, "Complete!\n");
    }
    if let Some(name) = command
        .strip_prefix("userdel ")
        .and_then(|rest| rest.split_once(" || useradd "))
        .map(|(name, _)| name)
    {
        toggle(&mut state.users, name);
        return CommandOutput::new(0, "");
    }
    if let Some(name) = command
        .strip_prefix("groupdel ")
        .and_then(|rest| rest.split_once(" || groupadd "))
        .map(|(name, _)| name)
    {
        toggle(&mut state.groups, name);
        return CommandOutput::new(0, "");
    }
    not_found()
}

/// Shell answering the commands the checks run from a [`MockGuest`].
#[derive(Debug)]
pub struct GuestShell {
    guest: MockGuest,
    unreachable_for: AtomicU32,
    closes: AtomicU32,
}

impl GuestShell {
    /// Fail the first `attempts` commands as if the guest were still
    /// booting.
    pub fn unreachable_for(self, attempts: u32) -> Self {
        self.unreachable_for.store(attempts, Ordering::SeqCst);
        self
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteShell for GuestShell {
    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let refused = self
            .unreachable_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            anyhow::bail!("ssh: connect to host port 22: Connection refused");
        }

        let out = execute(&mut lock(&self.guest.state), command);
        info!(command, rc = out.rc, "[MOCK] Guest command");
        Ok(out)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
