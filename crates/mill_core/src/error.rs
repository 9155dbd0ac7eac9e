//! Error types shared across the coordination core.
//!
//! The taxonomy distinguishes conditions the UI must treat differently:
//! retryable timeouts, verbatim device rejections, silent operator
//! cancellations, and hard "no tier had the content" failures.

use thiserror::Error;

/// Top-level error for core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No storage tier yielded program content.
    ///
    /// Carries a summarized message; per-tier failure reasons are logged at
    /// the point of collection, not propagated individually.
    #[error("Program content unavailable for '{program}': {summary}")]
    ContentUnavailable { program: String, summary: String },

    /// The free-name/number search exhausted its bound without a free slot.
    #[error("No free {space} found after {attempts} attempts")]
    NamingExhausted { space: String, attempts: u32 },

    /// The write-authorization gate rejected or was cancelled.
    ///
    /// User-initiated cancellation is not a failure; callers abort the save
    /// without surfacing an error toast.
    #[error("Write authorization denied")]
    AuthorizationDenied,

    /// The device capability layer answered `success=false`.
    ///
    /// The message is the device's verbatim text and must be surfaced as-is.
    #[error("{message}")]
    DeviceRejected { message: String },

    /// A storage-tier fetch exceeded its deadline.
    ///
    /// Distinguished from generic transport failure so the UI can offer a
    /// retry instead of a generic error.
    #[error("Timed out during {operation}")]
    Timeout { operation: String },

    /// A bridge-store path (or other addressed resource) does not exist.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Generic transport/collaborator failure.
    #[error("{message}")]
    Transport { message: String },

    /// A precondition on the in-memory model was not met.
    #[error("{0}")]
    InvalidState(String),
}

impl CoreError {
    /// Create a content-unavailable error.
    pub fn content_unavailable(program: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::ContentUnavailable {
            program: program.into(),
            summary: summary.into(),
        }
    }

    /// Create a naming-exhausted error.
    pub fn naming_exhausted(space: impl Into<String>, attempts: u32) -> Self {
        Self::NamingExhausted {
            space: space.into(),
            attempts,
        }
    }

    /// Create a device-rejected error carrying the device's own message.
    pub fn device_rejected(message: impl Into<String>) -> Self {
        Self::DeviceRejected {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a generic transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Whether this error represents a missing resource (used by the store
    /// resolver to decide between "recover and retry" and "give up").
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error is a retryable timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
