// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for Pakt
#[derive(Error, Debug)]
pub enum Error {
    /// No local catalog copy and no refresh requested
    #[error("Catalog not available at {0}; run `pakt update` first")]
    CatalogUnavailable(PathBuf),

    /// Package name has no catalog record
    #[error("Package '{0}' not found in catalog")]
    PackageNotFound(String),

    /// Archive digest does not match the catalog
    #[error("Integrity failure for {package}: expected {expected}, got {actual}")]
    IntegrityFailure {
        package: String,
        expected: String,
        actual: String,
    },

    /// Installed package has no file manifest
    #[error("Manifest for '{0}' is missing, cannot remove")]
    ManifestMissing(String),

    /// Removal would delete a file owned by essential tooling
    #[error("Refusing to remove {package}: {path} is essential (owned by {owner})")]
    EssentialFileConflict {
        package: String,
        path: String,
        owner: String,
    },

    /// Network or mirror transfer failure
    #[error("Fetch error: {0}")]
    FetchError(String),

    /// Maintainer script exited unsuccessfully
    #[error("Script {script} failed with {status}")]
    ScriptExecutionError { script: String, status: String },

    /// Declared digest length maps to no known algorithm
    #[error("Unsupported digest length {length} for package {package}")]
    UnsupportedDigest { package: String, length: usize },

    /// Settings store problem
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed catalog or ledger text
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Archive could not be read or unpacked
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::PackageNotFound(_) => 2,
            Error::IntegrityFailure { .. } => 3,
            Error::ManifestMissing(_) => 4,
            Error::EssentialFileConflict { .. } => 5,
            Error::CatalogUnavailable(_) => 6,
            Error::FetchError(_) => 7,
            Error::ScriptExecutionError { .. } => 8,
            Error::UnsupportedDigest { .. } | Error::ConfigError(_) => 9,
            Error::ParseError(_) | Error::ArchiveError(_) | Error::Io(_) => 1,
        }
    }

    /// Whether this error must stop the whole run rather than one target
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            Error::IntegrityFailure { .. }
                | Error::UnsupportedDigest { .. }
                | Error::ManifestMissing(_)
                | Error::EssentialFileConflict { .. }
        )
    }
}

/// Result type alias using Pakt's Error type
pub type Result<T> = std::result::Result<T, Error>;
