use std::path::PathBuf;
use thiserror::Error;

/// Core error type for configuration and sandbox setup.
///
/// Engine failures use [`crate::pkg::PkgError`], which carries stable codes.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    ConfigValue { key: &'static str, value: String },

    #[error("Could not determine a home directory for the sandbox")]
    HomeNotFound,

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
