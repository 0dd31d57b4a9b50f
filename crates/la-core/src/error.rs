//! Error types for the Learning Assistant core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for every execution context.
///
/// The first six variants are the failure taxonomy the controllers reason
/// about. The remaining variants cover the storage and plumbing layers and are
/// converted into a reported outcome before they reach a user.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LaError {
    /// A required base URL or provider setting is absent.
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    /// Bad credentials, bad one-time code, or a denied OAuth grant.
    #[error("{0}")]
    AuthFailure(String),

    /// An action needed a valid token and none was available.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The collaborator rejected the role or membership check.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Collaborator unreachable or answered with a non-success status.
    #[error("Network error{}: {message}", fmt_status(.status))]
    NetworkFailure {
        status: Option<u16>,
        message: String,
    },

    /// A relay target had no live listener.
    #[error("No receiving end for {target}")]
    DeliveryFailure { target: String },

    /// A collaborator call exceeded its time bound.
    #[error("{operation} timed out after {after_secs}s")]
    Timeout { operation: String, after_secs: u64 },

    /// A message crossing a context boundary had an unrecognized shape.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Durable store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LaError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn config_missing(what: impl Into<String>) -> Self {
        Self::ConfigMissing(what.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthFailure(message.into())
    }

    pub fn network(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            status,
            message: message.into(),
        }
    }

    pub fn delivery(target: impl Into<String>) -> Self {
        Self::DeliveryFailure {
            target: target.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Rebuilds an error from the `{error, status}` pair of a failed response.
    pub fn from_response(message: impl Into<String>, status: Option<u16>) -> Self {
        let message = message.into();
        match status {
            Some(401) => Self::NotAuthenticated,
            Some(403) => Self::AccessDenied(message),
            _ => Self::NetworkFailure { status, message },
        }
    }

    // ============================================================================
    // Inspection
    // ============================================================================

    /// HTTP-like status carried in a failed response, when one applies.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotAuthenticated => Some(401),
            Self::AccessDenied(_) => Some(403),
            Self::NetworkFailure { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }

    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. } | Self::Timeout { .. })
    }

    /// Delivery failures are expected and never surface to a sender.
    pub fn is_delivery(&self) -> bool {
        matches!(self, Self::DeliveryFailure { .. })
    }

    pub fn is_config_missing(&self) -> bool {
        matches!(self, Self::ConfigMissing(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for LaError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for LaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for LaError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for LaError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// A type alias for `Result<T, LaError>`.
pub type Result<T> = std::result::Result<T, LaError>;
