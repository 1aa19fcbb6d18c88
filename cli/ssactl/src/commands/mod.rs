//! CLI commands.

mod cidr;
#[cfg(unix)]
mod facts;
mod matrix;
mod schedule;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// ssactl - SmartState Analysis verification helpers.
#[derive(Debug, Parser)]
#[command(name = "ssactl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect the facts a scan of a Unix guest should report, over SSH.
    #[cfg(unix)]
    Facts(facts::FactsCommand),

    /// Print the start time a scheduled analysis would use.
    ScheduleSlot(schedule::ScheduleSlotCommand),

    /// Describe a subnet given as address and netmask.
    Cidr(cidr::CidrCommand),

    /// List the provider x analysis type test matrix.
    Matrix(matrix::MatrixCommand),

    /// Show the settings a verification run would use.
    Config(settings::ConfigCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            format: self.format,
        };

        match self.command {
            #[cfg(unix)]
            Commands::Facts(cmd) => cmd.run(ctx).await,
            Commands::ScheduleSlot(cmd) => cmd.run(ctx),
            Commands::Cidr(cmd) => cmd.run(ctx),
            Commands::Matrix(cmd) => cmd.run(ctx),
            Commands::Config(cmd) => cmd.run(ctx),
            Commands::Version => {
                println!("ssactl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext {
    pub format: OutputFormat,
}
