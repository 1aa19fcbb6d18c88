//! Facts collected directly on the guest.
//!
//! These are the reference values a scan is compared against. Counts are
//! kept as the text the guest printed, since the product displays them as
//! text too.

use serde::Serialize;
use tracing::info;

use crate::shell::RemoteShell;
use crate::system::UnixFlavor;
use crate::SmartStateError;

pub const USERS_COUNT_COMMAND: &str = "cat /etc/passwd | wc -l";
pub const GROUPS_COUNT_COMMAND: &str = "cat /etc/group | wc -l";
pub const OS_RELEASE_COMMAND: &str = "cat /etc/os-release";

/// Expected scan results for a Unix guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectedFacts {
    pub users: String,
    pub groups: String,
    pub packages: String,
    pub services: String,
}

/// Run `command` and return its newline-trimmed output, failing on a
/// non-zero exit.
pub async fn query(shell: &dyn RemoteShell, command: &str) -> Result<String, SmartStateError> {
    let out = shell.run_command(command).await?;
    if !out.success() {
        return Err(SmartStateError::Command {
            command: command.to_string(),
            rc: out.rc,
            output: out.output,
        });
    }
    Ok(out.trimmed().to_string())
}

/// Collect users, groups, packages and services counts.
pub async fn collect_expected_facts(
    shell: &dyn RemoteShell,
    flavor: &UnixFlavor,
) -> Result<ExpectedFacts, SmartStateError> {
    let facts = ExpectedFacts {
        users: query(shell, USERS_COUNT_COMMAND).await?,
        groups: query(shell, GROUPS_COUNT_COMMAND).await?,
        packages: query(shell, flavor.package_count_command).await?,
        services: query(shell, flavor.service_count_command).await?,
    };
    info!(
        flavor = flavor.key,
        users = %facts.users,
        groups = %facts.groups,
        packages = %facts.packages,
        services = %facts.services,
        "Collected expected facts"
    );
    Ok(facts)
}

/// Toggle user `name` (delete it if present, otherwise create it) and
/// return the resulting user count.
pub async fn add_user(shell: &dyn RemoteShell, name: &str) -> Result<String, SmartStateError> {
    query(shell, &format!("userdel {name} || useradd {name}")).await?;
    let count = query(shell, USERS_COUNT_COMMAND).await?;
    info!(user = name, count = %count, "Added user");
    Ok(count)
}

/// Toggle group `name` and return the resulting group count.
pub async fn add_group(shell: &dyn RemoteShell, name: &str) -> Result<String, SmartStateError> {
    query(shell, &format!("groupdel {name} || groupadd {name}")).await?;
    let count = query(shell, GROUPS_COUNT_COMMAND).await?;
    info!(group = name, count = %count, "Added group");
    Ok(count)
}

/// Install the flavor's test package, if it has an install command, and
/// return the resulting package count.
///
/// The install's own exit status is logged, not checked: the package may
/// already be present.
pub async fn install_package(
    shell: &dyn RemoteShell,
    flavor: &UnixFlavor,
) -> Result<String, SmartStateError> {
    if let Some(command) = flavor.install_package_command() {
        let out = shell.run_command(&command).await?;
        info!(package = flavor.package, rc = out.rc, output = %out.trimmed(), "Installed package");
    }
    query(shell, flavor.package_count_command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::MockShell;
    use crate::system::flavor;

    fn centos_shell() -> MockShell {
        let centos = flavor("centos").unwrap();
        MockShell::new()
            .respond(USERS_COUNT_COMMAND, 0, "21\n")
            .respond(GROUPS_COUNT_COMMAND, 0, "40\n")
            .respond(centos.package_count_command, 0, "\n311\n")
            .respond(centos.service_count_command, 0, "187\n")
    }

    #[tokio::test]
    async fn collects_trimmed_counts() {
        let shell = centos_shell();
        let facts = collect_expected_facts(&shell, flavor("centos").unwrap())
            .await
            .unwrap();
        assert_eq!(
            facts,
            ExpectedFacts {
                users: "21".to_string(),
                groups: "40".to_string(),
                packages: "311".to_string(),
                services: "187".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let shell = MockShell::new().respond(USERS_COUNT_COMMAND, 1, "permission denied");
        let err = collect_expected_facts(&shell, flavor("rhel").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SmartStateError::Command { rc: 1, .. }));
    }

    #[tokio::test]
    async fn add_user_runs_toggle_then_counts() {
        let shell = MockShell::new()
            .respond("userdel ssa-x || useradd ssa-x", 0, "")
            .respond(USERS_COUNT_COMMAND, 0, "22\n");
        assert_eq!(add_user(&shell, "ssa-x").await.unwrap(), "22");
        assert_eq!(
            shell.commands(),
            vec!["userdel ssa-x || useradd ssa-x", USERS_COUNT_COMMAND]
        );
    }

    #[tokio::test]
    async fn rhel_package_check_installs_nothing() {
        let rhel = flavor("rhel").unwrap();
        let shell = MockShell::new().respond(rhel.package_count_command, 0, "402\n");
        assert_eq!(install_package(&shell, rhel).await.unwrap(), "402");
        assert_eq!(shell.commands(), vec![rhel.package_count_command]);
    }

    #[tokio::test]
    async fn install_failure_is_tolerated() {
        let fedora = flavor("fedora").unwrap();
        let shell = MockShell::new()
            .respond("dnf install -y iso-codes", 1, "already installed")
            .respond(fedora.package_count_command, 0, "512\n");
        assert_eq!(install_package(&shell, fedora).await.unwrap(), "512");
    }
}
