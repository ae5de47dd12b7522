//! Error types for the terminology crate.

#[cfg(feature = "persistence")]
use std::path::PathBuf;

/// Result type for terminology operations.
pub type TerminologyResult<T> = Result<T, TerminologyError>;

/// Errors that can occur while talking to a terminology server or reading
/// recorded expansions.
///
/// The [`criteria_mapper::TerminologyService`] implementations of this crate
/// never surface these; they log them and answer with an empty result.
#[derive(Debug, thiserror::Error)]
pub enum TerminologyError {
    /// Transport failure or timeout.
    #[cfg(feature = "http-client")]
    #[error("request to {url} failed: {source}")]
    Http {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("{url} answered with HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// A response body was not the expected FHIR resource.
    #[error("unexpected response from {url}: {source}")]
    Decode {
        /// Requested URL.
        url: String,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// I/O error while reading or writing a snapshot.
    #[cfg(feature = "persistence")]
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Snapshot file could not be serialized or parsed.
    #[cfg(feature = "persistence")]
    #[error("snapshot file {path} is invalid: {source}")]
    Snapshot {
        /// File involved.
        path: PathBuf,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A snapshot file does not belong to the value set its name claims.
    #[cfg(feature = "persistence")]
    #[error("hash mismatch for {filename}: expected {expected}")]
    HashMismatch {
        /// File name listed in the manifest.
        filename: String,
        /// Hash computed from the stored canonical.
        expected: String,
    },
}

impl TerminologyError {
    /// Creates an I/O error with path context.
    #[cfg(feature = "persistence")]
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
