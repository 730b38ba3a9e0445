//! Entcat Command-Line Client
//!
//! Manages enterprise catalogs in a local store.

mod commands;
mod error;
mod formatter;
mod inputs;

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser};
use entcat_core::{CatalogConfig, CatalogService, StorageConfig, DEFAULT_LMS_BASE_URL};

use commands::{execute, Command};
use error::CliError;
use formatter::{format_value, OutputFormat};
use inputs::split_list;

/// Store and link settings shared by every subcommand.
#[derive(ClapArgs, Debug)]
pub struct StoreArgs {
    /// Path to the catalog store directory
    #[arg(short, long, default_value = "./entcat_data", env = "ENTCAT_DATA_PATH")]
    pub data_path: PathBuf,

    /// Root of enrollment URLs and xAPI activity ids
    #[arg(long, default_value = DEFAULT_LMS_BASE_URL, env = "ENTCAT_LMS_BASE_URL")]
    pub lms_base_url: String,

    /// Store page cache size in megabytes
    #[arg(long, default_value_t = 64)]
    pub cache_mb: u64,

    /// Comma-separated course modes for catalogs that name none
    #[arg(long)]
    pub default_course_modes: Option<String>,
}

impl StoreArgs {
    /// Convert command-line arguments to catalog configuration.
    pub fn into_config(self) -> CatalogConfig {
        let storage = StorageConfig::new(self.data_path)
            .with_cache_capacity(self.cache_mb * 1024 * 1024);
        let config = CatalogConfig::new(storage).with_lms_base_url(self.lms_base_url);
        match self.default_course_modes.as_deref().map(split_list) {
            Some(modes) if !modes.is_empty() => config.with_default_course_modes(modes),
            _ => config,
        }
    }
}

/// Entcat Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "entcat")]
#[command(version, about = "Enterprise catalog management")]
pub struct Args {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format
    #[arg(long, default_value = "pretty", value_enum, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entcat=info,entcat_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let Args {
        store,
        format,
        command,
    } = args;
    let config = store.into_config();

    tracing::debug!(
        data_path = %config.storage.path.display(),
        lms_base_url = %config.lms_base_url,
        "configuration loaded"
    );

    let service = CatalogService::open(config)?;
    if service.store().was_recovered() {
        tracing::info!("opened existing catalog store");
    }

    let result = execute(&service, command)?;
    service.flush()?;
    println!("{}", format_value(&result, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contains() {
        let args = Args::try_parse_from([
            "entcat",
            "--data-path",
            "/tmp/entcat",
            "contains",
            "5f3f1b3e-0000-4000-8000-000000000000",
            "--course-run-id",
            "cr-1",
            "--course-run-id",
            "cr-2",
        ])
        .unwrap();

        match args.command {
            Command::Contains { course_run_ids, program_uuids, .. } => {
                assert_eq!(course_run_ids, vec!["cr-1", "cr-2"]);
                assert!(program_uuids.is_empty());
            }
            other => panic!("Expected contains, got {other:?}"),
        }
        assert_eq!(args.format, OutputFormat::Pretty);
    }

    #[test]
    fn test_into_config() {
        let args = Args::try_parse_from([
            "entcat",
            "--lms-base-url",
            "https://lms.example.com/",
            "--default-course-modes",
            "verified,audit",
            "history",
            "5f3f1b3e-0000-4000-8000-000000000000",
        ])
        .unwrap();

        let config = args.store.into_config();
        assert_eq!(config.lms_base_url, "https://lms.example.com");
        assert_eq!(config.default_course_modes, vec!["verified", "audit"]);
        assert_eq!(config.storage.cache_capacity, 64 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_uuid_rejected() {
        assert!(Args::try_parse_from(["entcat", "delete-catalog", "not-a-uuid"]).is_err());
    }
}
