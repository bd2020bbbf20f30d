use std::path::PathBuf;

/// Error taxonomy for the fetch engine.
///
/// Metadata-fetch failures never surface through this type on their own;
/// they are folded into condition results (or ignored entirely when no
/// condition needs the metadata). Everything else propagates to the caller
/// of the poll or download operation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Network or HTTP failure. Retrying is at the caller's discretion.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// No listing entry survived pattern and version filtering. Retried
    /// across poll cycles since the listing may change underneath us.
    #[error("no file found matching {pattern}")]
    NotFound { pattern: String },

    /// A metadata artifact was fetched but could not be parsed.
    #[error("unusable metadata from {url}: {reason}")]
    Metadata { url: String, reason: String },

    /// Downloaded bytes do not match the published digest. Never retried.
    #[error("checksum mismatch for {path}: expected {expected}, computed {computed}")]
    Integrity {
        path: PathBuf,
        expected: String,
        computed: String,
    },

    /// Conditions still unmet when the wait budget ran out.
    #[error("image conditions not met within {budget_secs}s")]
    Timeout { budget_secs: u64 },

    /// Malformed version-format template or condition declaration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
