use reqwest::StatusCode;

use crate::core::stream::StreamError;

/// Maximum number of body characters kept on an [`ApiError`].
const MAX_ERROR_BODY_LEN: usize = 500;

/// Classification of a failed HTTP exchange by status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 401
    Authentication,
    /// 403
    Permission,
    /// 404
    NotFound,
    /// 422
    Validation,
    /// 429
    RateLimit,
    /// 5xx
    Server,
    /// Any other status >= 400
    Other,
}

impl ApiErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 => ApiErrorKind::Authentication,
            403 => ApiErrorKind::Permission,
            404 => ApiErrorKind::NotFound,
            422 => ApiErrorKind::Validation,
            429 => ApiErrorKind::RateLimit,
            code if code >= 500 => ApiErrorKind::Server,
            _ => ApiErrorKind::Other,
        }
    }

    /// Stable identifier for structured logging
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorKind::Authentication => "authentication_error",
            ApiErrorKind::Permission => "permission_error",
            ApiErrorKind::NotFound => "not_found_error",
            ApiErrorKind::Validation => "validation_error",
            ApiErrorKind::RateLimit => "rate_limit_error",
            ApiErrorKind::Server => "server_error",
            ApiErrorKind::Other => "api_error",
        }
    }
}

/// Error response returned by the service
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("HTTP {}: {message}", .status.as_u16())]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub body: String,
}

impl ApiError {
    /// Build an error from a status and the raw response body.
    ///
    /// The body is capped so a misbehaving server cannot flood logs.
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        let body = if body.chars().count() > MAX_ERROR_BODY_LEN {
            let capped: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
            format!("{capped}... (truncated)")
        } else {
            body
        };

        let message = match status.canonical_reason() {
            Some(reason) => format!("{} {reason}", status.as_u16()),
            None => status.as_u16().to_string(),
        };

        Self {
            status,
            message,
            body,
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        ApiErrorKind::from_status(self.status)
    }
}

/// Errors returned by client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The service answered with a status >= 400
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The HTTP request could not be completed
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket dial or handshake failed
    #[error("websocket dial failed: {0}")]
    Connection(String),

    /// A request body or start event could not be serialized
    #[error("failed to encode request: {0}")]
    Encode(String),

    /// A response body could not be deserialized
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Request parameters rejected before anything was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// A stream ended with a terminal error
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ClientError {
    /// The API classification, if this error came from an HTTP status.
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            ClientError::Api(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
