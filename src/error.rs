//! Error types for the TokenRouter SDK

use thiserror::Error;

/// Result type alias for TokenRouter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification shared by every [`Error`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credentials were rejected or are missing
    Authentication,
    /// The service asked the caller to slow down
    RateLimit,
    /// The request was malformed, either locally or according to the server
    InvalidRequest,
    /// The server answered with a payload the SDK could not decode
    InvalidResponse,
    /// No usable connection to the service
    Connection,
    /// The service failed with a 5xx status
    InternalServer,
    /// Anything the SDK does not recognise
    Unknown,
}

/// Main error type for the TokenRouter SDK
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication failed (401/403, or no API key configured)
    #[error("Authentication error: {message}")]
    Authentication {
        /// Human readable message
        message: String,
        /// HTTP status, when the server answered
        status: Option<u16>,
        /// Raw response body, when the server answered
        body: Option<String>,
    },

    /// The account's quota is exhausted (403 mentioning quota)
    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        /// Human readable message
        message: String,
        /// HTTP status
        status: u16,
        /// Raw response body
        body: Option<String>,
    },

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        /// Human readable message
        message: String,
        /// Seconds to wait, exactly as announced by the server
        retry_after: Option<u64>,
        /// Raw response body
        body: Option<String>,
    },

    /// The request is invalid, detected locally or reported by the server
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Human readable message
        message: String,
        /// HTTP status, `None` when rejected before any network call
        status: Option<u16>,
        /// Raw response body
        body: Option<String>,
    },

    /// The server's payload could not be decoded
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Human readable message
        message: String,
        /// Raw payload that failed to decode
        body: Option<String>,
    },

    /// Connection to the API failed or dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The API failed with a 5xx status
    #[error("Internal server error ({status}): {message}")]
    InternalServer {
        /// Human readable message
        message: String,
        /// HTTP status
        status: u16,
        /// Raw response body
        body: Option<String>,
    },

    /// Unrecognised API failure
    #[error("API error ({status}): {message}")]
    Api {
        /// Human readable message
        message: String,
        /// HTTP status
        status: u16,
        /// Raw response body
        body: Option<String>,
    },

    /// Provider key encryption failed locally
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an authentication error that did not come from the server
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication {
            message: msg.into(),
            status: None,
            body: None,
        }
    }

    /// Create an invalid-request error detected before any network call
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
            status: None,
            body: None,
        }
    }

    /// Create an invalid-response error
    pub fn invalid_response(msg: impl Into<String>, body: Option<String>) -> Self {
        Self::InvalidResponse {
            message: msg.into(),
            body,
        }
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an encryption error
    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } | Self::QuotaExceeded { .. } => ErrorKind::Authentication,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::InvalidRequest { .. } | Self::Config(_) => ErrorKind::InvalidRequest,
            Self::InvalidResponse { .. } => ErrorKind::InvalidResponse,
            Self::Connection(_) | Self::Timeout(_) => ErrorKind::Connection,
            Self::InternalServer { .. } => ErrorKind::InternalServer,
            Self::Api { .. } | Self::Encryption(_) => ErrorKind::Unknown,
        }
    }

    /// HTTP status the server answered with, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } | Self::InvalidRequest { status, .. } => *status,
            Self::QuotaExceeded { status, .. }
            | Self::InternalServer { status, .. }
            | Self::Api { status, .. } => Some(*status),
            Self::RateLimit { .. } => Some(429),
            _ => None,
        }
    }

    /// Raw response body kept for diagnostics
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Authentication { body, .. }
            | Self::QuotaExceeded { body, .. }
            | Self::RateLimit { body, .. }
            | Self::InvalidRequest { body, .. }
            | Self::InvalidResponse { body, .. }
            | Self::InternalServer { body, .. }
            | Self::Api { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    /// Seconds the server asked to wait before retrying
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether repeating the same request may succeed
    ///
    /// Rate limits only qualify when the server said how long to wait.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::InternalServer { .. } => true,
            Self::RateLimit { retry_after, .. } => retry_after.is_some(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_response(format!("malformed JSON payload: {err}"), None)
    }
}
