//! Error types for runtime operations

use crate::api::Status;
use frt_container::ContainerError;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while binding a device or driving the pipeline
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Image could not be parsed
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// No platform/device pair matched, or every match was busy
    #[error("No available device '{device}' on any '{vendor}' platform")]
    DeviceNotFound {
        /// Platform vendor searched for
        vendor: String,
        /// Device name searched for
        device: String,
    },

    /// Program build failed on the bound device
    #[error("Failed to build program for '{device}': {status}")]
    Build {
        /// Device the image was built against
        device: String,
        /// Per-device build status
        status: Status,
    },

    /// A compute API call returned a non-success status
    #[error("{operation} failed: {status}")]
    Api {
        /// API call that failed
        operation: &'static str,
        /// Status it returned
        status: Status,
    },

    /// No buffer or argument is registered under this index
    #[error("No buffer for argument index {index}")]
    UnknownArgument {
        /// Argument index
        index: usize,
    },

    /// Pipeline stage called out of order
    #[error("Pipeline in invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Create an API failure error
    pub const fn api(operation: &'static str, status: Status) -> Self {
        Self::Api { operation, status }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Status code carried by this error, if it came from the compute API
    pub const fn status(&self) -> Option<Status> {
        match self {
            Self::Build { status, .. } | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
