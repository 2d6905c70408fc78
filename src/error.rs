use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the phpvm core. Every operation returns one of these;
/// none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed version string, rejected before any I/O happens.
    #[error("invalid version string '{text}': {reason}")]
    Parse { text: String, reason: String },

    /// Network failure or timeout. Retryable by the caller, never retried
    /// automatically.
    #[error("download failed: {0}")]
    Transfer(String),

    /// Checksum mismatch. The offending bytes are discarded, so a retry
    /// forces a full re-download.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    /// Corrupt archive or failed extraction. Triggers rollback, nothing is
    /// persisted.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The internal state was updated but the external PATH entry could not
    /// be written. The caller may retry just the PATH step.
    #[error("PHP {identity} is active in local state, but updating the PATH entry failed: {reason}")]
    PartialActivation { identity: String, reason: String },

    /// Target file or directory is busy (e.g. locked files on removal).
    /// The operation is aborted without partial deletion.
    #[error("resource busy: {}: {reason}", path.display())]
    LockedResource { path: PathBuf, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    /// The caller cancelled an in-flight operation. Follows the same
    /// rollback path as a mid-step failure.
    #[error("operation cancelled")]
    Cancelled,

    #[error("state file error: {0}")]
    State(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
