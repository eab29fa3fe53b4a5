//! Error types for archive construction and extraction.

use thiserror::Error;

/// Errors raised by the archive codecs and the façade built on them.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Bad or missing signature, malformed header, unsafe entry name
    #[error("Invalid archive format: {0}")]
    Format(String),

    /// Header checksum or payload CRC does not match the stored value
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Valid archive using a feature this codec does not implement
    #[error("Unsupported archive feature: {0}")]
    Unsupported(String),

    /// Underlying filesystem failure, passed through unchanged
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ArchiveError>;
