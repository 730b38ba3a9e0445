//! Loading command inputs from arguments and files.

use std::fs;
use std::path::Path;

use entcat_core::{
    ContentFilter, EnterpriseContext, StaticDiscoveryClient, StaticEnterpriseContexts,
};
use serde_json::Value;

use crate::error::CliError;

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a JSON argument, reading it from a file when prefixed with `@`.
pub fn json_arg(raw: &str) -> Result<Value, CliError> {
    let text = match raw.strip_prefix('@') {
        Some(path) => read_file(Path::new(path))?,
        None => raw.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

/// Parse a content filter argument.
pub fn content_filter_arg(raw: &str) -> Result<ContentFilter, CliError> {
    Ok(ContentFilter::from_value(json_arg(raw)?)?)
}

/// Discovery client serving the `{"results": [...]}` document in `path`.
pub fn load_discovery(path: &Path) -> Result<StaticDiscoveryClient, CliError> {
    let body: Value = serde_json::from_str(&read_file(path)?)?;
    Ok(StaticDiscoveryClient::from_response(&body)?)
}

/// Enterprise contexts from a JSON array of `{uuid, name, last_modified_date}`.
pub fn load_enterprises(path: &Path) -> Result<StaticEnterpriseContexts, CliError> {
    let contexts: Vec<EnterpriseContext> = serde_json::from_str(&read_file(path)?)?;
    Ok(contexts.into_iter().collect())
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
