//! Domain-specific error types for C2-Hunter.
//!
//! Uses `thiserror` for ergonomic error definitions that integrate
//! with the broader `anyhow` error handling strategy.

use thiserror::Error;

/// Errors that can occur while reading flow or domain logs.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to open input file '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Required field '{field}' not found: no column named '{column}' in input header")]
    MissingColumn { field: &'static str, column: String },

    #[error("Delimiter must be a single ASCII character, got '{0}'")]
    InvalidDelimiter(String),

    #[error("Failed to read delimited input: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors that can occur while loading or editing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required configuration option '{key}' is missing")]
    MissingOption { key: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown configuration option: {0}")]
    UnknownKey(String),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
