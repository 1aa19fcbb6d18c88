//! Output formatting for CLI commands.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// A name/value row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct Field {
    #[tabled(rename = "FIELD")]
    pub field: String,
    #[tabled(rename = "VALUE")]
    pub value: String,
}

impl Field {
    pub fn new(field: impl Into<String>, value: impl ToString) -> Self {
        Self {
            field: field.into(),
            value: value.to_string(),
        }
    }
}

/// Render rows in the requested format.
pub fn render<T: Serialize + Tabled>(data: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table if data.is_empty() => "No items found.".dimmed().to_string(),
        OutputFormat::Table => Table::new(data).to_string(),
        OutputFormat::Json => format_json(data, "[]"),
    }
}

/// Print rows in the requested format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    println!("{}", render(data, format));
}

/// Print a single item as JSON, or as a field table.
pub fn print_fields<T: Serialize>(data: &T, fields: &[Field], format: OutputFormat) {
    match format {
        OutputFormat::Table => print_output(fields, format),
        OutputFormat::Json => println!("{}", format_json(data, "{}")),
    }
}

/// Print an info message.
pub fn print_info(message: &str) {
    eprintln!("{} {}", "Info:".blue().bold(), message);
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| fallback.to_string())
}
