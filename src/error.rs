//! Error types for the Cloud Endpoints controller

use thiserror::Error;

use crate::crd::CloudEndpointStatus;

/// Main error type for controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Google API call failed
    #[error("{api} error (status {status:?}): {message}")]
    Google {
        /// API that failed (e.g. "servicemanagement", "compute")
        api: &'static str,
        /// HTTP status code, if a response was received
        status: Option<u16>,
        /// Description of what failed
        message: String,
    },

    /// A long-running backend operation completed with an error
    #[error("operation {name} failed: {message}")]
    Operation {
        /// Operation name as returned by the backend
        name: String,
        /// Error reported by the operation
        message: String,
    },

    /// The composed API document is malformed
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced cluster resources cannot be used as a target
    #[error("unsupported configuration: {0}")]
    Misconfigured(String),

    /// Template rendering failed
    #[error("template error: {0}")]
    Template(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Process configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a Google API error with the HTTP status of the failed response
    pub fn google(api: &'static str, status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Google {
            api,
            status,
            message: msg.into(),
        }
    }

    /// Create a failed-operation error
    pub fn operation(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Operation {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a misconfiguration error with the given message
    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::Misconfigured(msg.into())
    }

    /// Create a template error with the given message
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true when the failure was a 403 or 404 from a Google API.
    ///
    /// Service Management answers both for a service that does not exist yet,
    /// so callers use this to tell "absent" from "lookup failed".
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            Self::Google {
                status: Some(403 | 404),
                ..
            }
        )
    }

    /// Returns true when the error means convergence must restart from IDLE.
    ///
    /// Only a malformed document qualifies: the input has to change before a
    /// retry can succeed.
    pub fn resets_convergence(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<minijinja::Error> for Error {
    fn from(e: minijinja::Error) -> Self {
        Self::Template(e.to_string())
    }
}

/// A failed sync, carrying the status computed before the failure
///
/// The transport still reports this status in its response body; the caller
/// decides whether to persist it.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct SyncFailure {
    /// Status computed for this call
    pub status: CloudEndpointStatus,
    /// The error that stopped the call
    #[source]
    pub source: Error,
}
