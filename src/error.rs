//! Unified error handling for the edutrack crate
//!
//! Layer-specific errors ([`StorageError`], [`SyncError`]) are folded into a
//! single [`Error`] enum that services return and the API layer converts into
//! an HTTP status plus response envelope.
//!
//! # Architecture
//!
//! - [`EdutrackErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use edutrack::error::{Error, ErrorCategory, EdutrackErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.category() == ErrorCategory::NotFound {
//!         println!("{}", err.user_message());
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::storage::StorageError;
pub use crate::sync::SyncError;

/// Common trait for all edutrack error types
pub trait EdutrackErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;

    /// Message that is safe to show to API callers
    fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Storage | ErrorCategory::Other => self.category().desc().to_string(),
            _ => self.to_string(),
        }
    }
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A referenced record does not exist
    NotFound,
    /// Input rejected before any write
    Validation,
    /// Duplicate natural key
    Conflict,
    /// Missing or unknown credentials
    Unauthorized,
    /// Authenticated but not allowed
    Forbidden,
    /// Storage and I/O errors
    Storage,
    /// Network-related errors (CRM HTTP calls)
    Network,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short description for the category
    pub fn desc(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::Validation => "validation error",
            Self::Conflict => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Storage => "storage error",
            Self::Network => "network error",
            Self::Config => "configuration error",
            Self::Other => "internal error",
        }
    }
}

impl EdutrackErrorTrait for StorageError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Sqlite(_) | Self::Io(_))
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            _ => ErrorCategory::Storage,
        }
    }
}

/// Unified error type for the edutrack crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Storage errors other than not-found and conflict
    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    /// External CRM synchronization errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EdutrackErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_recoverable(),
            Self::Sync(e) => e.is_recoverable(),
            Self::Io(_) => true,
            _ => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Unauthorized(_) => ErrorCategory::Unauthorized,
            Self::Forbidden(_) => ErrorCategory::Forbidden,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Sync(e) => e.category(),
            Self::Json(_) => ErrorCategory::Validation,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Singular record name for a storage collection
fn record_kind(collection: &'static str) -> &'static str {
    match collection {
        "users" => "user",
        "courses" => "course",
        "batches" => "batch",
        other => other,
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { collection, id } => Self::NotFound {
                kind: record_kind(collection),
                id,
            },
            StorageError::Conflict { collection, key } => {
                Self::Conflict(format!("{} '{key}' already exists", record_kind(collection)))
            }
            other => Self::Storage(other),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let err: Error = StorageError::not_found("courses", "abc").into();
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(err.to_string(), "course 'abc' not found");

        let err: Error = StorageError::conflict("users", "a@b.c").into();
        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert!(err.to_string().contains("user 'a@b.c' already exists"));

        let err: Error = StorageError::LockPoisoned("boom".into()).into();
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err: Error = StorageError::LockPoisoned("mutex at 0xdead".into()).into();
        assert_eq!(err.user_message(), "storage error");

        let err = Error::validation("title cannot be empty");
        assert_eq!(err.user_message(), "Validation error: title cannot be empty");
    }

    #[test]
    fn test_is_recoverable() {
        let err = Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(err.is_recoverable());
        assert!(!Error::validation("bad").is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("interval must be positive");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.user_message(), "internal error");
    }
}
