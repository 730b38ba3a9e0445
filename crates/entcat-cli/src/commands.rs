//! Subcommands and their execution.

use std::path::PathBuf;

use clap::Subcommand;
use entcat_core::{CatalogDefinition, CatalogService, CatalogUpdate, ContainsQuery};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::CliError;
use crate::inputs::{content_filter_arg, load_discovery, load_enterprises, split_list};

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a content filter to a shared catalog query
    Resolve {
        /// Content filter as JSON, or @path to a JSON file
        #[arg(long)]
        filter: String,
        /// Query to overwrite or create
        #[arg(long)]
        query_uuid: Option<Uuid>,
        /// Query title
        #[arg(long)]
        title: Option<String>,
    },

    /// Create an enterprise catalog
    CreateCatalog {
        #[arg(long)]
        title: String,
        #[arg(long)]
        enterprise_uuid: Uuid,
        /// Content filter as JSON, or @path to a JSON file
        #[arg(long)]
        filter: String,
        /// Catalog identifier (generated when omitted)
        #[arg(long)]
        uuid: Option<Uuid>,
        #[arg(long)]
        query_uuid: Option<Uuid>,
        #[arg(long)]
        query_title: Option<String>,
        /// Comma-separated enrollment modes
        #[arg(long)]
        course_modes: Option<String>,
        /// Publish audit enrollment URLs
        #[arg(long)]
        audit_urls: bool,
    },

    /// Edit an enterprise catalog
    UpdateCatalog {
        uuid: Uuid,
        #[arg(long)]
        title: Option<String>,
        /// Content filter as JSON, or @path to a JSON file
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        query_uuid: Option<Uuid>,
        #[arg(long)]
        query_title: Option<String>,
        /// Comma-separated enrollment modes
        #[arg(long)]
        course_modes: Option<String>,
        #[arg(long)]
        audit_urls: Option<bool>,
    },

    /// Delete an enterprise catalog
    DeleteCatalog { uuid: Uuid },

    /// Delete a catalog query, detaching the catalogs that use it
    DeleteQuery { uuid: Uuid },

    /// Refresh a catalog's content from a discovery response file
    Sync {
        uuid: Uuid,
        /// File holding a discovery response, {"results": [...]}
        #[arg(long)]
        discovery_file: PathBuf,
    },

    /// Print the projected content of a catalog
    Project {
        uuid: Uuid,
        /// File holding a JSON array of enterprise customers
        #[arg(long)]
        enterprises_file: PathBuf,
    },

    /// Check whether a catalog contains course runs or programs
    Contains {
        uuid: Uuid,
        #[arg(long = "course-run-id")]
        course_run_ids: Vec<String>,
        #[arg(long = "program-uuid")]
        program_uuids: Vec<String>,
    },

    /// Print the audit history of a catalog or query
    History { uuid: Uuid },
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, CliError> {
    Ok(serde_json::to_value(value)?)
}

/// Run one subcommand and return its result document.
pub fn execute(service: &CatalogService, command: Command) -> Result<Value, CliError> {
    match command {
        Command::Resolve {
            filter,
            query_uuid,
            title,
        } => {
            let filter = content_filter_arg(&filter)?;
            let query = service.resolve_query(&filter, query_uuid, title.as_deref())?;
            to_value(&query)
        }

        Command::CreateCatalog {
            title,
            enterprise_uuid,
            filter,
            uuid,
            query_uuid,
            query_title,
            course_modes,
            audit_urls,
        } => {
            let definition = CatalogDefinition {
                uuid,
                title,
                enterprise_uuid,
                content_filter: content_filter_arg(&filter)?,
                catalog_query_uuid: query_uuid,
                query_title,
                enabled_course_modes: course_modes.as_deref().map(split_list),
                publish_audit_enrollment_urls: audit_urls,
            };
            to_value(&service.create_catalog(definition)?)
        }

        Command::UpdateCatalog {
            uuid,
            title,
            filter,
            query_uuid,
            query_title,
            course_modes,
            audit_urls,
        } => {
            let update = CatalogUpdate {
                title,
                content_filter: filter.as_deref().map(content_filter_arg).transpose()?,
                catalog_query_uuid: query_uuid,
                query_title,
                enabled_course_modes: course_modes.as_deref().map(split_list),
                publish_audit_enrollment_urls: audit_urls,
            };
            to_value(&service.update_catalog(uuid, update)?)
        }

        Command::DeleteCatalog { uuid } => to_value(&service.delete_catalog(uuid)?),

        Command::DeleteQuery { uuid } => to_value(&service.delete_query(uuid)?),

        Command::Sync {
            uuid,
            discovery_file,
        } => {
            let client = load_discovery(&discovery_file)?;
            let report = service.sync_catalog(uuid, &client)?;
            Ok(json!({
                "created": report.created,
                "matched": report.matched,
                "skipped": report.skipped,
            }))
        }

        Command::Project {
            uuid,
            enterprises_file,
        } => {
            let enterprises = load_enterprises(&enterprises_file)?;
            let results = service.project_catalog_content(uuid, &enterprises)?;
            Ok(json!({
                "count": results.len(),
                "content_last_modified": service.content_last_modified(uuid)?,
                "results": results,
            }))
        }

        Command::Contains {
            uuid,
            course_run_ids,
            program_uuids,
        } => {
            let request = ContainsQuery::new(course_run_ids, program_uuids)?;
            let contains = service.contains_content_items(uuid, &request)?;
            Ok(json!({ "contains_content_items": contains }))
        }

        Command::History { uuid } => to_value(&service.history(uuid)?),
    }
}
