//! Provider x analysis type matrix.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use ssa_smartstate::config::{ProviderData, SuiteConfig};
use tabled::Tabled;

use super::CommandContext;
use crate::config::default_provider_data;
use crate::error::CliError;
use crate::output::print_output;

/// List the provider x analysis type test matrix.
#[derive(Debug, Args)]
pub struct MatrixCommand {
    /// Provider data document; defaults to SSA_PROVIDER_DATA, then to
    /// providers.toml in the config directory.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Only list this provider.
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct MatrixRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "PROVIDER")]
    provider: String,
    #[tabled(rename = "TYPE")]
    analysis_type: String,
    #[tabled(rename = "IMAGE")]
    image: String,
    #[tabled(rename = "FS")]
    fs_type: String,
    #[tabled(rename = "SHELL")]
    shell: bool,
}

fn matrix_rows(data: &ProviderData, path: &Path, provider: Option<&str>) -> Result<Vec<MatrixRow>> {
    if let Some(key) = provider {
        data.provider(key)?;
    }

    let mut rows = Vec::new();
    for entry in data.test_matrix() {
        if provider.is_some_and(|key| key != entry.provider) {
            continue;
        }
        let resolved = data
            .provisioning_data(&entry.provider, &entry.analysis_type)
            .with_context(|| format!("Failed to resolve {}", entry.id))?;
        rows.push(MatrixRow {
            shell: !resolved.is_windows_fs() && resolved.credentials.is_some(),
            fs_type: resolved.data.fs_type.clone().unwrap_or_default(),
            image: resolved.image,
            id: entry.id,
            provider: entry.provider,
            analysis_type: entry.analysis_type,
        });
    }

    if rows.is_empty() {
        return Err(CliError::EmptyMatrix(path.to_path_buf()).into());
    }
    Ok(rows)
}

impl MatrixCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let suite = SuiteConfig::from_env()?;
        let path = match self.data {
            Some(path) => path,
            None => suite.provider_data_path(&default_provider_data()?),
        };
        let data = ProviderData::load(&path)?;
        let rows = matrix_rows(&data, &path, self.provider.as_deref())?;
        print_output(&rows, ctx.format);
        Ok(())
    }
}
