//! Webhook notifications: creation, queue wire format and delivery.
//!
//! A [`Notification`] is immutable. Its body and HMAC key are kept in wire
//! form (see [`crate::codec`]) so a notification can move through the
//! queue without being re-encoded. Display and Debug never show either.

use std::{collections::BTreeMap, fmt, time::Duration};

use bytes::Bytes;
use chrono::Utc;
use dss_core::{Clock, Config, DeploymentStage};
use http::{
    header::{HeaderValue, CONTENT_TYPE},
    HeaderMap, HeaderName, Method,
};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use url::Url;

use crate::{
    client::{classify_response, DeliveryClient, DeliveryResponse, PreparedRequest},
    codec::{bin2wire, wire2bin},
    endpoint::BodyEncoding,
    error::{ErrorCategory, NotifyError, Result},
    guard::{validate_callback_url, HostResolver},
    multipart::encode_form_data,
    queue::{MessageAttribute, QueueMessage},
    signing::HttpSignature,
};

/// Header carrying the 1-based attempt number.
pub const ATTEMPT_HEADER: HeaderName = HeaderName::from_static("x-dss-notify-attempt");

/// Everything that goes into [`Notification::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    /// Unique id of this notification.
    pub notification_id: String,
    /// Subscription the notification is for. Used as the queue group.
    pub subscription_id: String,
    /// Callback URL.
    pub url: String,
    /// HTTP method of the callback request.
    pub method: String,
    /// Body encoding, `application/json` or `multipart/form-data`.
    pub encoding: String,
    /// JSON payload.
    pub body: Value,
    /// Delivery budget. Falls back to the configured default.
    pub attempts: Option<u32>,
    /// Raw HMAC key. Requests are signed only when a key is present.
    pub hmac_key: Option<Vec<u8>>,
    /// Key id sent in the `Signature` header.
    pub hmac_key_id: Option<String>,
    /// Id tying the callback to the request that caused it.
    pub correlation_id: Option<String>,
}

impl NewNotification {
    /// A JSON `POST` notification with no key and the default budget.
    pub fn new(
        notification_id: impl Into<String>,
        subscription_id: impl Into<String>,
        url: impl Into<String>,
        body: Value,
    ) -> Self {
        Self {
            notification_id: notification_id.into(),
            subscription_id: subscription_id.into(),
            url: url.into(),
            method: crate::endpoint::DEFAULT_METHOD.to_string(),
            encoding: crate::endpoint::DEFAULT_ENCODING.to_string(),
            body,
            attempts: None,
            hmac_key: None,
            hmac_key_id: None,
            correlation_id: None,
        }
    }
}

/// Deployment facts notification creation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifySettings {
    /// Stage deciding which callback URLs are allowed.
    pub stage: DeploymentStage,
    /// Budget for notifications created without one.
    pub default_attempts: u32,
}

impl NotifySettings {
    /// Reads the stage and default budget from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self { stage: config.deployment_stage, default_attempts: config.notify_attempts }
    }
}

/// An immutable, validated webhook notification.
#[derive(Clone, PartialEq)]
pub struct Notification {
    notification_id: String,
    subscription_id: String,
    url: String,
    method: String,
    encoding: String,
    body: String,
    attempts: u32,
    hmac_key: Option<String>,
    hmac_key_id: Option<String>,
    queued_at: Option<f64>,
    correlation_id: Option<String>,
}

impl Notification {
    /// Validates the callback URL and encodes the body and key.
    ///
    /// # Errors
    ///
    /// Returns `ProhibitedScheme`, `InvalidUrl`, `Resolution` or
    /// `PrivateAddress` for a URL the deployment stage does not accept.
    pub async fn create(
        new: NewNotification,
        settings: &NotifySettings,
        resolver: &dyn HostResolver,
    ) -> Result<Self> {
        validate_callback_url(&new.url, settings.stage, resolver).await?;

        let body = serde_json::to_vec(&new.body).map_err(|e| NotifyError::codec(e.to_string()))?;
        let hmac_key = new.hmac_key.as_deref().map(bin2wire).transpose()?;

        Ok(Self {
            notification_id: new.notification_id,
            subscription_id: new.subscription_id,
            url: new.url,
            method: new.method,
            encoding: new.encoding,
            body: bin2wire(&body)?,
            attempts: new.attempts.unwrap_or(settings.default_attempts),
            hmac_key,
            hmac_key_id: new.hmac_key_id,
            queued_at: None,
            correlation_id: new.correlation_id,
        })
    }

    /// Unique id of this notification.
    pub fn notification_id(&self) -> &str {
        &self.notification_id
    }

    /// Subscription this notification belongs to.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Callback URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP method of the callback request.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Body encoding media type.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Remaining delivery attempts.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Key id sent in the `Signature` header, if any.
    pub fn hmac_key_id(&self) -> Option<&str> {
        self.hmac_key_id.as_deref()
    }

    /// Unix seconds at which the notification was last enqueued. Only set
    /// on notifications read back from a queue message.
    pub fn queued_at(&self) -> Option<f64> {
        self.queued_at
    }

    /// Correlation id of the originating request, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Decoded JSON body.
    pub fn body(&self) -> Result<Value> {
        let raw = wire2bin(&self.body)?;
        serde_json::from_slice(&raw).map_err(|e| NotifyError::InvalidBody { message: e.to_string() })
    }

    /// Copy with one attempt spent.
    ///
    /// # Errors
    ///
    /// Returns `NoAttemptsLeft` when the budget is already zero.
    pub fn spend_attempt(&self) -> Result<Self> {
        if self.attempts == 0 {
            return Err(NotifyError::NoAttemptsLeft {
                notification_id: self.notification_id.clone(),
            });
        }
        Ok(Self { attempts: self.attempts - 1, ..self.clone() })
    }

    /// Queue message for this notification, stamped with the current time.
    ///
    /// The deduplication id is the notification id suffixed with the
    /// remaining budget, so every retry of a notification gets its own id
    /// and a queue deduplication window never swallows it. The bare
    /// notification id travels in the `notification_id` attribute. Absent
    /// optional fields produce no attribute.
    pub fn to_wire_message(&self, clock: &dyn Clock) -> QueueMessage {
        let mut attributes = BTreeMap::new();
        let mut put = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                attributes.insert(name.to_string(), MessageAttribute::string(value));
            }
        };
        put("notification_id", Some(self.notification_id.clone()));
        put("url", Some(self.url.clone()));
        put("method", Some(self.method.clone()));
        put("encoding", Some(self.encoding.clone()));
        put("attempts", Some(self.attempts.to_string()));
        put("hmac_key", self.hmac_key.clone());
        put("hmac_key_id", self.hmac_key_id.clone());
        put("queued_at", Some(clock.unix_seconds().to_string()));
        put("correlation_id", self.correlation_id.clone());

        QueueMessage {
            message_body: self.body.clone(),
            message_deduplication_id: format!("{}-{}", self.notification_id, self.attempts),
            message_group_id: self.subscription_id.clone(),
            message_attributes: attributes,
        }
    }

    /// Reads a notification back from a queue message.
    ///
    /// A message without a `notification_id` attribute takes its id from
    /// the deduplication id.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` when a required attribute is missing or
    /// `attempts`/`queued_at` do not parse.
    pub fn from_wire_message(message: &QueueMessage) -> Result<Self> {
        let required = |name: &str| {
            message
                .attribute(name)
                .map(str::to_string)
                .ok_or_else(|| NotifyError::malformed(format!("missing attribute '{name}'")))
        };
        let optional = |name: &str| message.attribute(name).map(str::to_string);

        let attempts = required("attempts")?
            .parse::<u32>()
            .map_err(|e| NotifyError::malformed(format!("attempts: {e}")))?;
        let queued_at = required("queued_at")?
            .parse::<f64>()
            .map_err(|e| NotifyError::malformed(format!("queued_at: {e}")))?;

        Ok(Self {
            notification_id: optional("notification_id")
                .unwrap_or_else(|| message.message_deduplication_id.clone()),
            subscription_id: message.message_group_id.clone(),
            url: required("url")?,
            method: required("method")?,
            encoding: required("encoding")?,
            body: message.message_body.clone(),
            attempts,
            hmac_key: optional("hmac_key"),
            hmac_key_id: optional("hmac_key_id"),
            queued_at: Some(queued_at),
            correlation_id: optional("correlation_id"),
        })
    }

    /// Builds the HTTP request for one delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEncoding` for an encoding other than JSON or
    /// multipart, `InvalidBody` when a multipart body is not an object and
    /// `InvalidMethod`/`InvalidUrl` for unusable request lines.
    pub fn prepare_request(
        &self,
        timeout: Option<Duration>,
        attempt: Option<u32>,
    ) -> Result<PreparedRequest> {
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|_| NotifyError::InvalidMethod(self.method.clone()))?;
        let url = Url::parse(&self.url).map_err(|e| NotifyError::InvalidUrl {
            url: self.url.clone(),
            message: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        if let Some(attempt) = attempt {
            headers.insert(ATTEMPT_HEADER, HeaderValue::from(attempt));
        }

        let body = self.body()?;
        let (content_type, body) = match self.encoding.parse::<BodyEncoding>()? {
            BodyEncoding::Json => (
                "application/json".to_string(),
                serde_json::to_vec(&body).map_err(|e| NotifyError::codec(e.to_string()))?,
            ),
            BodyEncoding::MultipartFormData => {
                let Value::Object(fields) = body else {
                    return Err(NotifyError::InvalidBody {
                        message: "multipart body must be a JSON object".to_string(),
                    });
                };
                let encoded = encode_form_data(&fields);
                (encoded.content_type, encoded.body)
            },
        };
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&content_type)
                .map_err(|e| NotifyError::InvalidBody { message: e.to_string() })?,
        );

        if let Some(key) = &self.hmac_key {
            let signer = HttpSignature::new(wire2bin(key)?, self.hmac_key_id.clone());
            signer.sign(&method, &url, &mut headers, &body, Utc::now())?;
        }

        Ok(PreparedRequest { method, url, headers, body: Bytes::from(body), timeout })
    }

    /// Attempts delivery and reports whether the endpoint answered 2xx.
    ///
    /// Transport failures and non-2xx answers are logged and reported as
    /// `false`. A request that cannot be built at all is logged as an error.
    pub async fn deliver(
        &self,
        client: &DeliveryClient,
        timeout: Option<Duration>,
        attempt: Option<u32>,
    ) -> bool {
        match self.deliver_or_raise(client, timeout, attempt).await {
            Ok(_) => true,
            Err(NotifyError::Delivery(e)) => {
                warn!(category = %ErrorCategory::from(&e), error = %e, "failed delivering {}", self);
                false
            },
            Err(e) => {
                tracing::error!(error = %e, "cannot deliver {}", self);
                false
            },
        }
    }

    /// Attempts delivery and fails on anything but a 2xx answer.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Delivery` for transport failures and non-2xx
    /// statuses, or the [`Self::prepare_request`] error.
    pub async fn deliver_or_raise(
        &self,
        client: &DeliveryClient,
        timeout: Option<Duration>,
        attempt: Option<u32>,
    ) -> Result<DeliveryResponse> {
        let span = info_span!(
            "notification_delivery",
            notification_id = %self.notification_id,
            subscription_id = %self.subscription_id,
            correlation_id = self.correlation_id.as_deref().unwrap_or_default(),
            attempt
        );

        self.send(client, timeout, attempt).instrument(span).await
    }

    async fn send(
        &self,
        client: &DeliveryClient,
        timeout: Option<Duration>,
        attempt: Option<u32>,
    ) -> Result<DeliveryResponse> {
        let request = self.prepare_request(timeout, attempt)?;
        let response = client.execute(request).await?;

        if let Some(error) = classify_response(&response) {
            warn!(
                status = response.status_code,
                category = %ErrorCategory::from(&error),
                "failed delivering {}: HTTP status {}, response time {:.3}",
                self,
                response.status_code,
                response.duration.as_secs_f64()
            );
            return Err(error.into());
        }

        info!(
            status = response.status_code,
            "successfully delivered {}: HTTP status {}, response time {:.3}",
            self,
            response.status_code,
            response.duration.as_secs_f64()
        );
        Ok(response)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Notification(notification_id='{}', subscription_id='{}', url='{}', method='{}', \
             encoding='{}', attempts={}, hmac_key_id='{}', correlation_id='{}')",
            self.notification_id,
            self.subscription_id,
            self.url,
            self.method,
            self.encoding,
            self.attempts,
            self.hmac_key_id.as_deref().unwrap_or("None"),
            self.correlation_id.as_deref().unwrap_or("None"),
        )
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use dss_core::TestClock;
    use serde_json::json;

    use super::*;
    use crate::memory::StaticResolver;

    fn dev() -> NotifySettings {
        NotifySettings { stage: DeploymentStage::Dev, default_attempts: 10 }
    }

    async fn notification(new: NewNotification) -> Notification {
        Notification::create(new, &dev(), &StaticResolver::default()).await.unwrap()
    }

    fn sample() -> NewNotification {
        NewNotification {
            hmac_key: Some(b"very-secret".to_vec()),
            hmac_key_id: Some("key-1".to_string()),
            correlation_id: Some("corr-1".to_string()),
            ..NewNotification::new("n1", "s1", "http://hooks.example.com/cb", json!({"a": [1, 2]}))
        }
    }

    #[tokio::test]
    async fn create_applies_default_attempts() {
        let created = notification(NewNotification::new("n", "s", "http://x.example", json!({}))).await;
        assert_eq!(created.attempts(), 10);
        assert_eq!(created.queued_at(), None);

        let explicit = notification(NewNotification {
            attempts: Some(0),
            ..NewNotification::new("n", "s", "http://x.example", json!({}))
        })
        .await;
        assert_eq!(explicit.attempts(), 0);
    }

    #[tokio::test]
    async fn body_stored_in_wire_form() {
        let created = notification(sample()).await;
        assert_ne!(created.body, "{\"a\":[1,2]}");
        assert_eq!(created.body().unwrap(), json!({"a": [1, 2]}));
    }

    #[tokio::test]
    async fn wire_message_round_trips() {
        let created = notification(sample()).await;
        let clock = TestClock::at_unix_seconds(1_700_000_000);
        let message = created.to_wire_message(&clock);

        assert_eq!(message.message_deduplication_id, "n1-10");
        assert_eq!(message.attribute("notification_id"), Some("n1"));
        assert_eq!(message.message_group_id, "s1");
        assert_eq!(message.attribute("attempts"), Some("10"));
        assert_eq!(message.attribute("queued_at"), Some("1700000000"));

        let restored = Notification::from_wire_message(&message).unwrap();
        assert_eq!(restored.queued_at(), Some(1_700_000_000.0));
        assert_eq!(restored, Notification { queued_at: Some(1_700_000_000.0), ..created });
    }

    #[tokio::test]
    async fn each_retry_gets_its_own_deduplication_id() {
        let created = notification(sample()).await;
        let clock = TestClock::new();
        let first = created.to_wire_message(&clock);
        let retry = created.spend_attempt().unwrap().to_wire_message(&clock);

        assert_eq!(retry.message_deduplication_id, "n1-9");
        assert_ne!(first.message_deduplication_id, retry.message_deduplication_id);
        assert_eq!(Notification::from_wire_message(&retry).unwrap().notification_id(), "n1");
    }

    #[tokio::test]
    async fn id_falls_back_to_deduplication_id() {
        let created = notification(sample()).await;
        let mut message = created.to_wire_message(&TestClock::new());
        message.message_attributes.remove("notification_id");
        message.message_deduplication_id = "legacy".to_string();

        let restored = Notification::from_wire_message(&message).unwrap();
        assert_eq!(restored.notification_id(), "legacy");
    }

    #[tokio::test]
    async fn absent_optionals_produce_no_attributes() {
        let created = notification(NewNotification::new("n", "s", "http://x.example", json!({}))).await;
        let message = created.to_wire_message(&TestClock::new());
        for name in ["hmac_key", "hmac_key_id", "correlation_id"] {
            assert!(message.attribute(name).is_none(), "{name} should be absent");
        }
        assert_eq!(message.message_attributes["url"].data_type, "String");
    }

    #[tokio::test]
    async fn missing_attempts_is_malformed() {
        let created = notification(sample()).await;
        let mut message = created.to_wire_message(&TestClock::new());
        message.message_attributes.remove("attempts");
        assert!(matches!(
            Notification::from_wire_message(&message),
            Err(NotifyError::MalformedMessage { .. })
        ));
    }

    #[tokio::test]
    async fn spend_attempt_decrements_until_zero() {
        let created = notification(NewNotification {
            attempts: Some(1),
            ..NewNotification::new("n", "s", "http://x.example", json!({}))
        })
        .await;

        let spent = created.spend_attempt().unwrap();
        assert_eq!(spent.attempts(), 0);
        assert_eq!(created.attempts(), 1);
        assert!(matches!(spent.spend_attempt(), Err(NotifyError::NoAttemptsLeft { .. })));
    }

    #[tokio::test]
    async fn display_hides_body_and_key() {
        let created = notification(sample()).await;
        for rendered in [created.to_string(), format!("{created:?}")] {
            assert!(rendered.contains("notification_id='n1'"));
            assert!(rendered.contains("hmac_key_id='key-1'"));
            assert!(!rendered.contains(&created.body));
            assert!(!rendered.contains(created.hmac_key.as_deref().unwrap()));
        }
    }

    #[tokio::test]
    async fn prepare_json_request() {
        let created = notification(NewNotification::new("n", "s", "http://x.example/cb", json!({"k": "v"}))).await;
        let request = created.prepare_request(Some(Duration::from_secs(5)), Some(3)).unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers[&ATTEMPT_HEADER], "3");
        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
        assert_eq!(request.body, Bytes::from_static(b"{\"k\":\"v\"}"));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert!(request.headers.get(http::header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn prepare_multipart_request() {
        let created = notification(NewNotification {
            encoding: "multipart/form-data".to_string(),
            ..NewNotification::new("n", "s", "http://x.example/cb", json!({"payload": "{}"}))
        })
        .await;
        let request = created.prepare_request(None, None).unwrap();

        let content_type = request.headers[CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        assert!(request.headers.get(&ATTEMPT_HEADER).is_none());
        let body = String::from_utf8(request.body.to_vec()).unwrap();
        assert!(body.contains("name=\"payload\"\r\n\r\n{}\r\n"));
    }

    #[tokio::test]
    async fn unsupported_encoding_fails_at_prepare() {
        let created = notification(NewNotification {
            encoding: "text/plain".to_string(),
            ..NewNotification::new("n", "s", "http://x.example/cb", json!({}))
        })
        .await;
        assert_eq!(
            created.prepare_request(None, None).unwrap_err(),
            NotifyError::UnsupportedEncoding("text/plain".to_string())
        );
    }

    #[tokio::test]
    async fn keyed_request_is_signed() {
        let created = notification(sample()).await;
        let request = created.prepare_request(None, Some(1)).unwrap();
        let signer = HttpSignature::new(b"very-secret".to_vec(), None);
        assert!(signer.verify(&request.method, &request.url, &request.headers, &request.body));
    }
}
