//! Error types for the CRM synchronization job

use thiserror::Error;

use crate::error::{EdutrackErrorTrait, ErrorCategory};

/// Errors raised while talking to the external CRM
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP client could not be built
    #[error("CRM client initialization failed: {0}")]
    Init(String),

    /// Base URL is missing or malformed
    #[error("invalid CRM base URL '{0}'")]
    InvalidUrl(String),

    /// Connection, timeout or body read failure
    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// Body is not JSON or not a record list
    #[error("{endpoint} returned an unexpected payload: {reason}")]
    Payload { endpoint: String, reason: String },
}

impl SyncError {
    pub fn network(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub fn payload(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Payload {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

impl EdutrackErrorTrait for SyncError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Init(_) | Self::InvalidUrl(_) => ErrorCategory::Config,
            _ => ErrorCategory::Network,
        }
    }
}
