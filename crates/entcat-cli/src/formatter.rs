//! Output formatting for command results.

use clap::ValueEnum;
use serde_json::Value;

use crate::error::CliError;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented JSON
    Pretty,
    /// One JSON document per line
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Pretty => write!(f, "pretty"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Render a command result.
pub fn format_value(value: &Value, format: OutputFormat) -> Result<String, CliError> {
    let text = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Json => serde_json::to_string(value)?,
    };
    Ok(text)
}
