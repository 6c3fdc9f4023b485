//! Error types for the CRM client.
//!
//! # Design
//! The taxonomy is flat: every failure the library can produce is one variant
//! of `CrmError`. `RecordNotFound` gets a dedicated variant because callers
//! frequently distinguish "the record does not exist" from "the server sent
//! something we could not interpret." Variants carry the raw server response
//! where one was received, for diagnostics.

use thiserror::Error;

/// Result type alias for CRM operations.
pub type Result<T> = std::result::Result<T, CrmError>;

/// Errors returned by the session client and module services.
#[derive(Debug, Error)]
pub enum CrmError {
    /// The transport failed or the server answered with a non-2xx status.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        status: Option<u16>,
        response: Option<String>,
    },

    /// Credentials were rejected, or an authenticated operation was attempted
    /// without a session.
    #[error("authentication failed: {message}")]
    Authentication {
        message: String,
        response: Option<String>,
    },

    /// One or more field rules, relationship checks or business rules failed.
    /// Nothing was sent to the server.
    #[error("validation failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    /// A point read named a record the server reports as nonexistent.
    #[error("{module} record not found: {id}")]
    RecordNotFound {
        module: String,
        id: String,
        response: Option<String>,
    },

    /// The response could not be decoded or did not have the expected shape.
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        response: Option<String>,
    },

    /// Invalid client configuration. Raised at construction, never deferred.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CrmError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        CrmError::Connection {
            message: message.into(),
            status: None,
            response: None,
        }
    }

    pub(crate) fn authentication(message: impl Into<String>, response: Option<String>) -> Self {
        CrmError::Authentication {
            message: message.into(),
            response,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>, response: Option<String>) -> Self {
        CrmError::Protocol {
            message: message.into(),
            response,
        }
    }

    pub(crate) fn not_authenticated() -> Self {
        CrmError::authentication("no active session; call login first", None)
    }

    /// Build a validation error from a single message.
    pub fn validation(message: impl Into<String>) -> Self {
        CrmError::Validation {
            errors: vec![message.into()],
        }
    }

    /// Only transport failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrmError::Connection { .. })
    }

    /// Violation messages for `Validation`, empty for every other variant.
    pub fn validation_errors(&self) -> &[String] {
        match self {
            CrmError::Validation { errors } => errors,
            _ => &[],
        }
    }

    /// Raw server response attached to the error, if any.
    pub fn response(&self) -> Option<&str> {
        match self {
            CrmError::Connection { response, .. }
            | CrmError::Authentication { response, .. }
            | CrmError::RecordNotFound { response, .. }
            | CrmError::Protocol { response, .. } => response.as_deref(),
            CrmError::Validation { .. } | CrmError::Config(_) => None,
        }
    }
}
