//! Error types used throughout the transport

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every failure a transport operation can surface to its caller.
///
/// The set is closed: callers match on it to decide what to show, and the
/// retry layer consults [`NetworkError::is_retryable`] to decide whether an
/// attempt is worth repeating.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NetworkError {
    /// DNS, connect, timeout or socket failure.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The server answered with a status of 400 or above.
    #[error("HTTP status error: {status_code}")]
    HttpStatus { status_code: u16 },

    /// The body did not parse as the expected JSON envelope.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// None of the certificates in the verified chain matched a pin.
    #[error("Pin validation failed: {message}")]
    PinValidation { message: String },

    /// The trust store could not be assembled.
    #[error("Trust store error: {message}")]
    TrustStore { message: String },

    /// A provider certificate could not be decoded.
    #[error("Certificate {index} of provider '{provider}' is malformed: {message}")]
    CertificateFormat { provider: String, index: usize, message: String },

    /// Pinning cannot be enforced for this connection.
    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Invalid application id: {value:?}")]
    InvalidApplicationId { value: String },
}

impl NetworkError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse { message: message.into() }
    }

    pub fn trust_store(message: impl Into<String>) -> Self {
        Self::TrustStore { message: message.into() }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported { message: message.into() }
    }

    /// Status code carried by an [`NetworkError::HttpStatus`] error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status_code } => Some(*status_code),
            _ => None,
        }
    }

    /// 400-499
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code(), Some(400..=499))
    }

    pub fn is_bad_request(&self) -> bool {
        self.status_code() == Some(400)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status_code() == Some(429)
    }

    /// 500-599
    pub fn is_server_error(&self) -> bool {
        matches!(self.status_code(), Some(500..=599))
    }

    /// Whether another attempt could succeed.
    ///
    /// Transport failures always qualify, HTTP failures only when the server
    /// reported a 5xx. Everything else is a permanent condition.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::HttpStatus { .. } => self.is_server_error(),
            Self::MalformedResponse { .. }
            | Self::PinValidation { .. }
            | Self::TrustStore { .. }
            | Self::CertificateFormat { .. }
            | Self::Unsupported { .. }
            | Self::InvalidApplicationId { .. } => false,
        }
    }
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Configuration could not be loaded or is inconsistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("No config file found in probed locations")]
    NotFound,

    #[error("Failed to read config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue { field: field.into(), message: message.into() }
    }
}
