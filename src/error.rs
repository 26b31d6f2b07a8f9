use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PhenoError {
    #[error("missing config file phenosync.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown time zone: {0}")]
    UnknownTimezone(String),

    #[error("invalid metadata pattern for field {field}: {message}")]
    InvalidPattern { field: String, message: String },

    #[error("catalog request failed: {0}")]
    Catalog(String),

    #[error("catalog row has invalid field {field}: {message}")]
    CatalogRow { field: String, message: String },

    #[error("failed to parse ledger at {path}: {message}")]
    LedgerParse { path: String, message: String },

    #[error("ledger belongs to {found}, configured dataset is {expected}")]
    #[diagnostic(help("use a separate dataset directory per experiment"))]
    LedgerMismatch { expected: String, found: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Raw blob could not be staged; the image stays pending.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transfer of {remote_path} failed: {reason}")]
pub struct TransferFailure {
    pub remote_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeFailure {
    #[error("not a valid container: {0}")]
    InvalidContainer(String),

    #[error("corrupted payload: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("no format descriptor for dataformat code {0}")]
    UnknownFormat(i32),

    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Failure of a single image inside a reconciliation pass.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Transfer(#[from] TransferFailure),

    #[error(transparent)]
    Decode(#[from] DecodeFailure),

    #[error("failed to write output: {0}")]
    Write(String),

    #[error("local i/o failed: {0}")]
    Io(String),
}
