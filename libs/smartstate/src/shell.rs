//! Remote shell on the guest under test.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

/// Result of a command run on the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status.
    pub rc: i32,

    /// Combined output.
    pub output: String,
}

impl CommandOutput {
    pub fn new(rc: i32, output: impl Into<String>) -> Self {
        Self {
            rc,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.rc == 0
    }

    /// Output with leading and trailing newlines removed.
    pub fn trimmed(&self) -> &str {
        self.output.trim_matches(|c| c == '\n' || c == '\r')
    }
}

/// A management channel to a guest.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `command` and capture its exit status and output.
    async fn run_command(&self, command: &str) -> Result<CommandOutput>;

    /// Drop the current connection. The next command reconnects.
    async fn close(&self) -> Result<()>;

    /// Time since the guest booted, from `/proc/uptime`.
    async fn uptime(&self) -> Result<Duration> {
        let out = self.run_command("cat /proc/uptime").await?;
        if !out.success() {
            anyhow::bail!("reading /proc/uptime failed with exit code {}", out.rc);
        }
        let secs: f64 = out
            .trimmed()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .parse()
            .with_context(|| format!("unexpected /proc/uptime contents: {:?}", out.output))?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Shell with scripted responses, for tests.
///
/// Commands without a scripted response exit with 127.
#[derive(Debug, Default)]
pub struct MockShell {
    responses: Mutex<HashMap<String, CommandOutput>>,
    log: Mutex<Vec<String>>,
    closes: Mutex<u32>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response to `command`.
    pub fn respond(self, command: &str, rc: i32, output: &str) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(command.to_string(), CommandOutput::new(rc, output));
        }
        self
    }

    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Number of times the shell was closed.
    pub fn closes(&self) -> u32 {
        self.closes.lock().map(|c| *c).unwrap_or_default()
    }
}

#[async_trait]
impl RemoteShell for MockShell {
    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        info!(command, "[MOCK] Running command");
        self.log
            .lock()
            .map_err(|_| anyhow::anyhow!("mock shell lock poisoned"))?
            .push(command.to_string());

        let responses = self
            .responses
            .lock()
            .map_err(|_| anyhow::anyhow!("mock shell lock poisoned"))?;
        Ok(responses
            .get(command)
            .cloned()
            .unwrap_or_else(|| CommandOutput::new(127, format!("{command}: command not found\n"))))
    }

    async fn close(&self) -> Result<()> {
        info!("[MOCK] Closing shell");
        *self
            .closes
            .lock()
            .map_err(|_| anyhow::anyhow!("mock shell lock poisoned"))? += 1;
        Ok(())
    }
}
