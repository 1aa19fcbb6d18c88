//! Effective run settings.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use ssa_inventory::LookupConfig;
use ssa_smartstate::config::SuiteConfig;

use super::CommandContext;
use crate::config::default_provider_data;
use crate::output::{print_fields, Field};

/// Show the settings a verification run would use.
#[derive(Debug, Args)]
pub struct ConfigCommand {}

#[derive(Debug, Serialize)]
struct Settings {
    provider_data: String,
    log_level: String,
    scan_delay: String,
    scan_timeout: String,
    drift_delay: String,
    drift_timeout: String,
    ip_timeout: String,
    ssh_timeout: String,
    inventory_delay: String,
    inventory_timeout: String,
}

fn human(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

impl Settings {
    fn resolve(suite: &SuiteConfig, lookup: &LookupConfig, fallback: &Path) -> Self {
        Self {
            provider_data: suite.provider_data_path(fallback).display().to_string(),
            log_level: suite.log_level.clone(),
            scan_delay: human(suite.scan.delay),
            scan_timeout: human(suite.scan.timeout),
            drift_delay: human(suite.drift.delay),
            drift_timeout: human(suite.drift.timeout),
            ip_timeout: human(suite.provision.ip_timeout),
            ssh_timeout: human(suite.provision.ssh_timeout),
            inventory_delay: human(lookup.delay),
            inventory_timeout: human(lookup.timeout),
        }
    }

    fn fields(&self) -> Vec<Field> {
        vec![
            Field::new("provider_data", &self.provider_data),
            Field::new("log_level", &self.log_level),
            Field::new("scan_delay", &self.scan_delay),
            Field::new("scan_timeout", &self.scan_timeout),
            Field::new("drift_delay", &self.drift_delay),
            Field::new("drift_timeout", &self.drift_timeout),
            Field::new("ip_timeout", &self.ip_timeout),
            Field::new("ssh_timeout", &self.ssh_timeout),
            Field::new("inventory_delay", &self.inventory_delay),
            Field::new("inventory_timeout", &self.inventory_timeout),
        ]
    }
}

impl ConfigCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let suite = SuiteConfig::from_env()?;
        let lookup = LookupConfig::from_env()?;
        let settings = Settings::resolve(&suite, &lookup, &default_provider_data()?);
        print_fields(&settings, &settings.fields(), ctx.format);
        Ok(())
    }
}
