//! Error types for notification construction and delivery.
//!
//! Construction errors are hard rejections: an invalid notification must
//! never be enqueued. Delivery errors carry enough context to classify a
//! failure (status, timeout) but never the notification body or key.

use std::fmt;

use thiserror::Error;

/// Result type alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Errors from creating, encoding, decoding or delivering a notification.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifyError {
    /// The callback URL uses a scheme the deployment stage forbids.
    #[error("The scheme '{scheme}' of URL '{url}' is prohibited. Allowed schemes are {allowed}.")]
    ProhibitedScheme {
        /// Offending scheme
        scheme: String,
        /// Full callback URL
        url: String,
        /// Schemes allowed in this stage
        allowed: String,
    },

    /// The callback host resolves to a non-global address.
    #[error("The hostname in URL '{url}' resolves to a private IP")]
    PrivateAddress {
        /// Full callback URL
        url: String,
    },

    /// The callback URL cannot be parsed or has no host.
    #[error("invalid callback URL '{url}': {message}")]
    InvalidUrl {
        /// The rejected URL
        url: String,
        /// Parser message
        message: String,
    },

    /// The callback host could not be resolved.
    #[error("failed to resolve host '{host}': {message}")]
    Resolution {
        /// Host name being resolved
        host: String,
        /// Resolver message
        message: String,
    },

    /// The body encoding is not one the delivery path can produce.
    #[error("Encoding {0} is not supported")]
    UnsupportedEncoding(String),

    /// The HTTP method is not a valid token.
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    /// The decoded body cannot be sent with the configured encoding.
    #[error("invalid notification body: {message}")]
    InvalidBody {
        /// What is wrong with the body
        message: String,
    },

    /// Subscription record fields have the wrong types.
    #[error("invalid subscription endpoint: {message}")]
    InvalidSubscription {
        /// Deserializer message
        message: String,
    },

    /// Wire encoding or decoding failed.
    #[error("wire codec error: {message}")]
    Codec {
        /// Codec failure description
        message: String,
    },

    /// A queue message lacks a required attribute or it does not parse.
    #[error("malformed queue message: {message}")]
    MalformedMessage {
        /// Which attribute is missing or invalid
        message: String,
    },

    /// `spend_attempt` was called on a notification with no attempts left.
    #[error("notification {notification_id} has no delivery attempts left")]
    NoAttemptsLeft {
        /// Identifier of the exhausted notification
        notification_id: String,
    },

    /// Request signing failed.
    #[error("failed to sign request: {message}")]
    Signing {
        /// Signer failure description
        message: String,
    },

    /// The queue rejected a message.
    #[error("failed to enqueue notification: {message}")]
    Queue {
        /// Queue failure description
        message: String,
    },

    /// The HTTP delivery attempt failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl NotifyError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec { message: message.into() }
    }

    /// Creates a malformed message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage { message: message.into() }
    }

    /// Category of the underlying delivery failure, if this is one.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Delivery(e) => Some(ErrorCategory::from(e)),
            _ => None,
        }
    }

    /// Returns `true` for errors that come from a bad subscription record.
    ///
    /// Retrying cannot fix these, so the retry path drops the notification.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnsupportedEncoding(_)
            | Self::InvalidMethod(_)
            | Self::InvalidBody { .. }
            | Self::InvalidUrl { .. }
            | Self::Codec { .. }
            | Self::Signing { .. } => true,
            Self::Delivery(e) => matches!(e, DeliveryError::ConfigurationError { .. }),
            Self::ProhibitedScheme { .. }
            | Self::PrivateAddress { .. }
            | Self::Resolution { .. }
            | Self::InvalidSubscription { .. }
            | Self::MalformedMessage { .. }
            | Self::NoAttemptsLeft { .. }
            | Self::Queue { .. } => false,
        }
    }
}

/// Failure of a single HTTP delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout that was exceeded, in milliseconds
        timeout_ms: u64,
    },

    /// HTTP response indicated client error (4xx).
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// HTTP response indicated server error (5xx).
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code (5xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Rate limit exceeded with retry guidance.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying
        retry_after_seconds: u64,
    },

    /// Non-2xx status outside the 4xx/5xx ranges, e.g. an unfollowed
    /// redirect.
    #[error("unexpected response: HTTP {status_code}")]
    UnexpectedStatus {
        /// HTTP status code
        status_code: u16,
    },

    /// Invalid client configuration.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates a client error from HTTP response.
    pub fn client_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ClientError { status_code, body: body.into() }
    }

    /// Creates a server error from HTTP response.
    pub fn server_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ServerError { status_code, body: body.into() }
    }

    /// Creates a rate limit error with retry guidance.
    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self::RateLimited { retry_after_seconds }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// HTTP status of the response, if the endpoint answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ClientError { status_code, .. }
            | Self::ServerError { status_code, .. }
            | Self::UnexpectedStatus { status_code } => Some(*status_code),
            Self::RateLimited { .. } => Some(429),
            Self::NetworkError { .. } | Self::Timeout { .. } | Self::ConfigurationError { .. } => {
                None
            },
        }
    }

    /// Determines if this error represents a temporary failure.
    ///
    /// Returns `true` for network errors, timeouts, server errors (5xx) and
    /// rate limits. Callers running their own backoff loop around
    /// `deliver_or_raise` use this to decide whether to try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. }
            | Self::Timeout { .. }
            | Self::ServerError { .. }
            | Self::RateLimited { .. } => true,

            Self::ClientError { .. }
            | Self::UnexpectedStatus { .. }
            | Self::ConfigurationError { .. } => false,
        }
    }

    /// Returns the suggested retry delay in seconds, if the endpoint gave
    /// one.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_seconds } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

/// Category of delivery error for logs and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network connectivity issues.
    Network,
    /// HTTP client errors (4xx) and unexpected statuses.
    Client,
    /// HTTP server errors (5xx).
    Server,
    /// Rate limiting.
    RateLimit,
    /// Configuration problems.
    Configuration,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::ClientError { .. } | DeliveryError::UnexpectedStatus { .. } => {
                Self::Client
            },
            DeliveryError::ServerError { .. } => Self::Server,
            DeliveryError::RateLimited { .. } => Self::RateLimit,
            DeliveryError::ConfigurationError { .. } => Self::Configuration,
        }
    }
}

impl ErrorCategory {
    /// Label used in the `category` log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Client => "client",
            Self::Server => "server",
            Self::RateLimit => "rate_limit",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
