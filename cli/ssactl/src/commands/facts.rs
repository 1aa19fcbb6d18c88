//! Reference facts of a guest, collected over SSH.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use ssa_smartstate::facts::{collect_expected_facts, ExpectedFacts};
use ssa_smartstate::provision::{detect_guest_system, wait_for_shell};
use ssa_smartstate::shell::RemoteShell;
use ssa_smartstate::ssh::{OpenSshShell, SshTarget};
use ssa_wait::{parse_duration, WaitOptions};
use tracing::warn;

use super::CommandContext;
use crate::error::CliError;
use crate::output::{print_fields, print_info, Field};

/// Collect the facts a scan of a Unix guest should report.
#[derive(Debug, Args)]
pub struct FactsCommand {
    /// Guest address.
    #[arg(long)]
    host: String,

    /// Login user; key or agent authentication is used.
    #[arg(long, default_value = "root")]
    user: String,

    #[arg(long, default_value_t = 22)]
    port: u16,

    /// Private key to authenticate with.
    #[arg(long)]
    keyfile: Option<PathBuf>,

    /// How long to wait for SSH to come up.
    #[arg(long, default_value = "60m", value_parser = parse_duration)]
    wait: Duration,

    /// Interval between SSH attempts.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    delay: Duration,
}

#[derive(Debug, Serialize)]
struct GuestFacts {
    host: String,
    system: String,
    os_type: &'static str,
    uptime_secs: u64,
    facts: ExpectedFacts,
}

impl GuestFacts {
    fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("system", &self.system),
            Field::new("os_type", self.os_type),
            Field::new("uptime", format!("{}s", self.uptime_secs)),
            Field::new("users", &self.facts.users),
            Field::new("groups", &self.facts.groups),
            Field::new("packages", &self.facts.packages),
            Field::new("services", &self.facts.services),
        ]
    }
}

async fn collect(shell: &dyn RemoteShell, host: &str, opts: &WaitOptions) -> Result<GuestFacts> {
    let uptime = wait_for_shell(shell, host, opts).await?;
    let system = detect_guest_system(shell).await?;
    let flavor = system
        .flavor()
        .ok_or_else(|| CliError::NotUnix(host.to_string()))?;
    let facts = collect_expected_facts(shell, flavor).await?;
    Ok(GuestFacts {
        host: host.to_string(),
        system: system.to_string(),
        os_type: system.os_type(),
        uptime_secs: uptime.as_secs(),
        facts,
    })
}

impl FactsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let target = SshTarget {
            port: self.port,
            keyfile: self.keyfile.clone(),
            ..SshTarget::new(&self.host, &self.user)
        };
        let shell = OpenSshShell::new(target);
        print_info(&format!(
            "Waiting up to {}s for SSH on {}@{}",
            self.wait.as_secs(),
            self.user,
            self.host
        ));

        let opts = WaitOptions::new(self.delay, self.wait);
        let result = collect(&shell, &self.host, &opts).await;
        if let Err(err) = shell.close().await {
            warn!(host = %self.host, error = %err, "Failed to close SSH session");
        }

        let facts = result?;
        print_fields(&facts, &facts.fields(), ctx.format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::Cli;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["ssactl", "facts", "--host", "10.0.0.5"]).unwrap();
        let debug = format!("{cli:?}");
        assert!(debug.contains("user: \"root\""));
        assert!(debug.contains("port: 22"));
        assert!(debug.contains("wait: 3600s"));
    }

    #[test]
    fn wait_accepts_human_durations() {
        assert!(Cli::try_parse_from(["ssactl", "facts", "--host", "h", "--wait", "90s"]).is_ok());
        assert!(Cli::try_parse_from(["ssactl", "facts", "--host", "h", "--wait", "soon"]).is_err());
    }
}
