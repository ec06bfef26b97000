//! Error types for container parsing

use std::path::PathBuf;
use thiserror::Error;
use xclbin_layout::SectionKind;

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors that can occur while reading an accelerator image
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Magic signature does not match this format
    ///
    /// Format probing treats this as "try the next parser", not as a failure.
    #[error("Not an xclbin2 image")]
    NotRecognized,

    /// No registered parser accepted the image
    #[error("Unrecognized accelerator image ({len} bytes, tried {tried} format(s))")]
    UnrecognizedFormat {
        /// Image length
        len: usize,
        /// Number of parsers tried
        tried: usize,
    },

    /// Image ended before a fixed-layout field
    #[error("Truncated image: {what} needs {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Field being decoded
        what: &'static str,
        /// Absolute offset of the field
        offset: usize,
        /// Bytes required
        needed: usize,
        /// Bytes present from `offset`
        available: usize,
    },

    /// Header mode code outside the known set
    #[error("Unknown xclbin mode: {code}")]
    UnknownMode {
        /// Raw `m_mode` value
        code: u16,
    },

    /// Required section is absent
    #[error("Missing {kind} section: cannot determine kernel name from binary")]
    MissingSection {
        /// Section kind
        kind: SectionKind,
    },

    /// Section payload points outside the image
    #[error("{kind} section [{offset}, +{size}) exceeds image of {len} bytes")]
    SectionOutOfBounds {
        /// Section kind
        kind: SectionKind,
        /// Payload offset
        offset: u64,
        /// Payload size
        size: u64,
        /// Image length
        len: usize,
    },

    /// Embedded metadata is malformed
    #[error("Invalid embedded metadata: {reason}")]
    Metadata {
        /// Reason for failure
        reason: String,
    },

    /// Image file not found
    #[error("Image file not found: {path}")]
    FileNotFound {
        /// Path that was attempted
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl ContainerError {
    /// Create a metadata error
    pub fn metadata(reason: impl Into<String>) -> Self {
        Self::Metadata {
            reason: reason.into(),
        }
    }

    /// Create a truncation error
    pub const fn truncated(what: &'static str, offset: usize, needed: usize, available: usize) -> Self {
        Self::Truncated {
            what,
            offset,
            needed,
            available,
        }
    }

    /// True if this only means "not this format"
    pub const fn is_not_recognized(&self) -> bool {
        matches!(self, Self::NotRecognized)
    }
}
