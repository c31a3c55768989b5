//! Error types for the ETL pipeline
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use std::path::Path;
use thiserror::Error;

/// The main error type for the pipeline
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Conversion Errors
    // ============================================================================
    #[error("Schema mismatch in '{path}': {message}")]
    SchemaMismatch { path: String, message: String },

    #[error("Unsupported input '{path}': {message}")]
    UnsupportedInput { path: String, message: String },

    // ============================================================================
    // Arrow/Parquet Errors
    // ============================================================================
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Output error: {message}")]
    Output { message: String },

    // ============================================================================
    // Watermark Errors
    // ============================================================================
    #[error("Watermark error: {message}")]
    Watermark { message: String },

    #[error("Invalid timestamp '{value}': {message}")]
    Timestamp { value: String, message: String },

    #[error("Column '{column}' in '{path}': {message}")]
    Column {
        path: String,
        column: String,
        message: String,
    },

    // ============================================================================
    // Upload Errors
    // ============================================================================
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Upload failed for {failed} of {total} files (first: {first_error})")]
    Upload {
        failed: usize,
        total: usize,
        first_error: String,
    },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    NotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a schema mismatch error for an input file
    pub fn schema_mismatch(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Create an unsupported input error
    pub fn unsupported_input(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Create a watermark error
    pub fn watermark(message: impl Into<String>) -> Self {
        Self::Watermark {
            message: message.into(),
        }
    }

    /// Create a timestamp parse error
    pub fn timestamp(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timestamp {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a column error
    pub fn column(
        path: impl AsRef<Path>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Column {
            path: path.as_ref().display().to_string(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error for a path
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            path: path.as_ref().display().to_string(),
        }
    }

    /// Check if this error means "the file is not there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Result type alias for the pipeline
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
