//! Error types for archive operations

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors that can occur while extracting, persisting or uploading records.
///
/// Every variant except the data-shape anomalies handled inside the
/// transcript builder is fatal to a pipeline run. `is_retryable` tells the
/// remote client which of them are worth another attempt first.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Missing credentials or an invalid pipeline configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The LiveChat API answered with a non-success status.
    #[error("API request {path} failed with status {status}: {body}")]
    Api {
        status: u16,
        path: String,
        body: String,
    },

    /// Connection, timeout or body transfer failure.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response or stored artifact was not the JSON shape we expect.
    #[error("Malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// A record identifier that cannot be used as a file name.
    #[error("Invalid record id {0:?}")]
    InvalidRecordId(String),

    /// Local filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Object storage rejected or failed an upload.
    #[error("Upload of {path} failed: {message}")]
    Upload { path: PathBuf, message: String },

    /// An admission gate refused a slot. Pipeline gates stay open for the
    /// whole run; abort goes through cancellation instead.
    #[error("Admission gate '{0}' closed")]
    Closed(&'static str),
}

impl ArchiveError {
    /// Wrap an `std::io::Error` together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt at the same request could plausibly succeed.
    ///
    /// Throttling (429) and server-side (5xx) statuses, plus connect and
    /// timeout failures, are transient. Everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArchiveError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            ArchiveError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
