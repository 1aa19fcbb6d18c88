//! OpenSSH-backed remote shell.
//!
//! Authenticates with keys or the agent; the ControlMaster connection is
//! opened lazily and re-opened after [`RemoteShell::close`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use openssh::{KnownHosts, Session, SessionBuilder};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::provision::{GuestCredentials, ShellConnector};
use crate::shell::{CommandOutput, RemoteShell};

/// Connection settings for [`OpenSshShell`].
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub keyfile: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: 22,
            keyfile: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    fn builder(&self) -> SessionBuilder {
        let mut builder = SessionBuilder::default();
        builder
            .user(self.user.clone())
            .port(self.port)
            .connect_timeout(self.connect_timeout)
            .known_hosts_check(KnownHosts::Add);
        if let Some(keyfile) = &self.keyfile {
            builder.keyfile(keyfile);
        }
        builder
    }
}

/// Remote shell over an OpenSSH multiplexed session.
pub struct OpenSshShell {
    target: SshTarget,
    session: Mutex<Option<Session>>,
}

impl OpenSshShell {
    pub fn new(target: SshTarget) -> Self {
        Self {
            target,
            session: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }
}

#[async_trait]
impl RemoteShell for OpenSshShell {
    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            debug!(host = %self.target.host, user = %self.target.user, "Opening SSH session");
            let session = self
                .target
                .builder()
                .connect(&self.target.host)
                .await
                .with_context(|| format!("Failed to connect to {}", self.target.host))?;
            *guard = Some(session);
        }
        let session = guard
            .as_ref()
            .context("SSH session missing after connect")?;

        info!(host = %self.target.host, command, "Running command");
        let output = session
            .raw_command(command)
            .output()
            .await
            .with_context(|| format!("Failed to run `{command}` on {}", self.target.host))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput::new(output.status.code().unwrap_or(-1), text))
    }

    async fn close(&self) -> Result<()> {
        if let Some(session) = self.session.lock().await.take() {
            debug!(host = %self.target.host, "Closing SSH session");
            session
                .close()
                .await
                .with_context(|| format!("Failed to close session to {}", self.target.host))?;
        }
        Ok(())
    }
}

/// Opens [`OpenSshShell`]s to freshly provisioned guests.
#[derive(Debug, Clone, Default)]
pub struct OpenSshConnector {
    pub port: Option<u16>,
    pub keyfile: Option<PathBuf>,
}

#[async_trait]
impl ShellConnector for OpenSshConnector {
    async fn connect(
        &self,
        host: &str,
        credentials: &GuestCredentials,
    ) -> Result<Box<dyn RemoteShell>> {
        let mut target = SshTarget::new(host, credentials.username.clone());
        if let Some(port) = self.port {
            target.port = port;
        }
        target.keyfile = self.keyfile.clone();
        Ok(Box::new(OpenSshShell::new(target)))
    }
}
