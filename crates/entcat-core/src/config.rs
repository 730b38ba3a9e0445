//! Catalog configuration.

use crate::model::DEFAULT_COURSE_MODES;
use crate::storage::StorageConfig;

/// Default LMS root used for enrollment URLs and xAPI activity ids.
pub const DEFAULT_LMS_BASE_URL: &str = "http://localhost:18000";

/// Top-level configuration for the catalog core.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Store configuration.
    pub storage: StorageConfig,

    /// Root of generated enrollment URLs and activity ids, without trailing slash.
    pub lms_base_url: String,

    /// Course modes given to catalogs that do not name their own.
    pub default_course_modes: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            lms_base_url: DEFAULT_LMS_BASE_URL.to_string(),
            default_course_modes: DEFAULT_COURSE_MODES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl CatalogConfig {
    /// Create a configuration around the given storage settings.
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            ..Default::default()
        }
    }

    /// Configuration with a temporary store, for tests.
    pub fn temporary() -> Self {
        Self::new(StorageConfig::temporary())
    }

    /// Set the LMS base URL. A trailing slash is dropped.
    pub fn with_lms_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.lms_base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Set the default course modes.
    pub fn with_default_course_modes(mut self, modes: Vec<String>) -> Self {
        self.default_course_modes = modes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lms_base_url_trims_slash() {
        let config = CatalogConfig::temporary().with_lms_base_url("https://lms.example.com/");
        assert_eq!(config.lms_base_url, "https://lms.example.com");
    }

    #[test]
    fn test_defaults() {
        let config = CatalogConfig::default();
        assert_eq!(config.lms_base_url, DEFAULT_LMS_BASE_URL);
        assert_eq!(config.default_course_modes[0], "verified");
    }
}
