//! Error handling and display for the CLI.

use std::path::PathBuf;

use colored::Colorize;
use ssa_networking::NetworkError;
use ssa_smartstate::config::ConfigError;
use ssa_smartstate::SmartStateError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No provider in {} has vm analysis data", .0.display())]
    EmptyMatrix(PathBuf),

    #[error("{0} is not a Unix guest; facts are collected over SSH")]
    NotUnix(String),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let hint = if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::EmptyMatrix(_) => {
                Some("Hint: Each provider needs a [providers.<key>.vm_analysis.vms.<type>] table.")
            }
            CliError::NotUnix(_) => None,
        }
    } else if let Some(config_err) = err.downcast_ref::<ConfigError>() {
        match config_err {
            ConfigError::UnknownProvider(_) => {
                Some("Hint: Run `ssactl matrix --data FILE` to list the configured providers.")
            }
            ConfigError::Read { .. } => Some("Hint: Set SSA_PROVIDER_DATA or pass --data."),
            _ => None,
        }
    } else if let Some(ssa_err) = err.downcast_ref::<SmartStateError>() {
        ssa_err
            .is_timeout()
            .then_some("Hint: The guest may still be booting. Raise --wait to give it longer.")
    } else if err.downcast_ref::<NetworkError>().is_some() {
        Some("Hint: Netmasks are dotted quads such as 255.255.255.0.")
    } else {
        None
    };

    if let Some(hint) = hint {
        eprintln!("\n{}", hint.yellow());
    }
}
