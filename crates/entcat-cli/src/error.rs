//! CLI error types.

use std::path::PathBuf;

use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Catalog core error.
    #[error(transparent)]
    Core(#[from] entcat_core::Error),

    /// A file named on the command line could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON input or output error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(err) if err.is_client_error() => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entcat_core::ValidationError;

    #[test]
    fn test_exit_codes() {
        let client: CliError =
            entcat_core::Error::from(ValidationError::new("catalog_query", "taken")).into();
        assert_eq!(client.exit_code(), 2);
        assert_eq!(client.to_string(), "validation error: catalog_query: taken");

        let server: CliError = entcat_core::Error::InvalidData("bad".into()).into();
        assert_eq!(server.exit_code(), 1);
    }
}
