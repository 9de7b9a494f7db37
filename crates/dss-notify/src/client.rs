//! HTTP client for callback delivery.
//!
//! Redirects are never followed: a 3xx answer from a subscriber counts as a
//! failed delivery. Timeouts are set per request so a single client can be
//! shared by deliveries with different budgets.

use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, Method};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::DeliveryError;

const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;
const MAX_RECORDED_BODY_SIZE: usize = 1024;

/// Configuration for the delivery client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User agent string for requests.
    pub user_agent: String,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { user_agent: "dss-notify/1.0".to_string(), verify_tls: true }
    }
}

/// A fully built callback request, ready to send.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method.
    pub method: Method,
    /// Callback URL.
    pub url: Url,
    /// Request headers, including any signature.
    pub headers: HeaderMap,
    /// Encoded request body.
    pub body: Bytes,
    /// Overall time limit. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Answer received from a subscriber.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body, truncated when large.
    pub body: String,
    /// Time from sending the request to reading the response.
    pub duration: Duration,
}

impl DeliveryResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Shared HTTP client with connection pooling.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
}

impl DeliveryClient {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn new(config: ClientConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Builds a client with default configuration.
    pub fn with_defaults() -> Result<Self, DeliveryError> {
        Self::new(ClientConfig::default())
    }

    /// Sends `request` and returns whatever the endpoint answered.
    ///
    /// Non-2xx statuses are returned as responses. Only failures to get an
    /// answer at all are errors:
    /// - `Timeout` when the request timeout elapses
    /// - `NetworkError` for connection and transport failures
    pub async fn execute(&self, request: PreparedRequest) -> Result<DeliveryResponse, DeliveryError> {
        let start_time = Instant::now();

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let duration = start_time.elapsed();
                warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                if e.is_timeout() {
                    let timeout_ms = request.timeout.map_or(0, |t| t.as_millis());
                    return Err(DeliveryError::timeout(u64::try_from(timeout_ms).unwrap_or(u64::MAX)));
                }
                if e.is_connect() {
                    return Err(DeliveryError::network(format!("connection failed: {e}")));
                }
                return Err(DeliveryError::network(e.to_string()));
            },
        };

        let duration = start_time.elapsed();
        debug!(status = response.status().as_u16(), duration_ms = duration.as_millis(), "received response");

        Ok(read_response(response, duration).await)
    }
}

async fn read_response(response: Response, duration: Duration) -> DeliveryResponse {
    let status_code = response.status().as_u16();
    let headers = response.headers().clone();

    let body = match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_RESPONSE_BODY_SIZE => {
            let suffix = "... (truncated)";
            let truncated = String::from_utf8_lossy(&bytes[..MAX_RECORDED_BODY_SIZE - suffix.len()]);
            format!("{truncated}{suffix}")
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("failed to read response body: {}", e);
            format!("[failed to read response body: {e}]")
        },
    };

    DeliveryResponse { status_code, headers, body, duration }
}

/// Classifies a non-2xx response as a delivery error.
///
/// Returns `None` for successful responses.
pub fn classify_response(response: &DeliveryResponse) -> Option<DeliveryError> {
    match response.status_code {
        200..=299 => None,
        429 => Some(DeliveryError::rate_limited(
            extract_retry_after_seconds(&response.headers).unwrap_or(DEFAULT_RETRY_AFTER),
        )),
        status @ 400..=499 => Some(DeliveryError::client_error(status, response.body.clone())),
        status @ 500..=599 => Some(DeliveryError::server_error(status, response.body.clone())),
        status_code => Some(DeliveryError::UnexpectedStatus { status_code }),
    }
}

const DEFAULT_RETRY_AFTER: u64 = 60;

/// Extracts the retry-after delay from response headers.
///
/// Supports both seconds format and HTTP-date format. Returns the delay in
/// seconds, or a default value (60s) if the header does not parse.
pub fn extract_retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    let retry_after = headers.get(http::header::RETRY_AFTER)?.to_str().unwrap_or_default();

    if let Ok(seconds) = retry_after.parse::<u64>() {
        return Some(seconds);
    }

    if let Ok(date_time) = chrono::DateTime::parse_from_rfc2822(retry_after) {
        let now = chrono::Utc::now();
        let retry_time = date_time.with_timezone(&chrono::Utc);
        if retry_time > now {
            if let Ok(duration) = retry_time.signed_duration_since(now).to_std() {
                return Some(duration.as_secs());
            }
        }
    }

    Some(DEFAULT_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn response(status_code: u16, headers: HeaderMap) -> DeliveryResponse {
        DeliveryResponse { status_code, headers, body: "body".to_string(), duration: Duration::ZERO }
    }

    #[test]
    fn retry_after_seconds_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(extract_retry_after_seconds(&headers), Some(120));

        headers.insert(http::header::RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(extract_retry_after_seconds(&headers), Some(60));

        assert_eq!(extract_retry_after_seconds(&HeaderMap::new()), None);
    }

    #[test]
    fn responses_classified_by_status() {
        assert_eq!(classify_response(&response(204, HeaderMap::new())), None);
        assert_eq!(
            classify_response(&response(404, HeaderMap::new())),
            Some(DeliveryError::client_error(404, "body"))
        );
        assert_eq!(
            classify_response(&response(503, HeaderMap::new())),
            Some(DeliveryError::server_error(503, "body"))
        );
        assert_eq!(
            classify_response(&response(302, HeaderMap::new())),
            Some(DeliveryError::UnexpectedStatus { status_code: 302 })
        );
        assert_eq!(
            classify_response(&response(429, HeaderMap::new())),
            Some(DeliveryError::rate_limited(60))
        );
    }
}
