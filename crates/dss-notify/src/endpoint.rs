//! Callback endpoint descriptors taken from subscription records.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NotifyError, Result};

/// Default HTTP method for callbacks.
pub const DEFAULT_METHOD: &str = "POST";

/// Default body encoding for callbacks.
pub const DEFAULT_ENCODING: &str = "application/json";

/// Default multipart field carrying the JSON payload.
pub const DEFAULT_PAYLOAD_FORM_FIELD: &str = "payload";

/// Where and how a subscriber wants to be called back.
///
/// Only the fields below are read from a subscription record. Everything
/// else in the record is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Target URL, absent for subscriptions without a callback.
    pub callback_url: Option<String>,
    /// HTTP method.
    #[serde(default = "default_method")]
    pub method: String,
    /// Body encoding, `application/json` or `multipart/form-data`.
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Static fields added to multipart bodies.
    #[serde(default)]
    pub form_fields: BTreeMap<String, String>,
    /// Multipart field the JSON payload is written to.
    #[serde(default = "default_payload_form_field")]
    pub payload_form_field: String,
}

/// Replacement values for [`Endpoint::extend`]. `None` keeps the current
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPatch {
    /// New target URL.
    pub callback_url: Option<String>,
    /// New HTTP method.
    pub method: Option<String>,
    /// New body encoding.
    pub encoding: Option<String>,
    /// New static multipart fields. Replaces the whole map.
    pub form_fields: Option<BTreeMap<String, String>>,
    /// New payload field name.
    pub payload_form_field: Option<String>,
}

/// Body encodings the delivery path knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    /// `application/json`
    Json,
    /// `multipart/form-data`
    MultipartFormData,
}

impl BodyEncoding {
    /// MIME type naming this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::MultipartFormData => "multipart/form-data",
        }
    }
}

impl FromStr for BodyEncoding {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "application/json" => Ok(Self::Json),
            "multipart/form-data" => Ok(Self::MultipartFormData),
            other => Err(NotifyError::UnsupportedEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for BodyEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Endpoint {
    /// Endpoint with defaults for everything but the URL.
    pub fn new(callback_url: impl Into<String>) -> Self {
        Self {
            callback_url: Some(callback_url.into()),
            method: default_method(),
            encoding: default_encoding(),
            form_fields: BTreeMap::new(),
            payload_form_field: default_payload_form_field(),
        }
    }

    /// Builds an endpoint from a stored subscription record.
    pub fn from_subscription(subscription: &Map<String, Value>) -> Result<Self> {
        let recognized: Map<String, Value> = subscription
            .iter()
            .filter(|(key, _)| {
                matches!(
                    key.as_str(),
                    "callback_url" | "method" | "encoding" | "form_fields" | "payload_form_field"
                )
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        serde_json::from_value(Value::Object(recognized))
            .map_err(|e| NotifyError::InvalidSubscription { message: e.to_string() })
    }

    /// Returns a copy with the patched fields replaced.
    #[must_use]
    pub fn extend(&self, patch: EndpointPatch) -> Self {
        Self {
            callback_url: patch.callback_url.or_else(|| self.callback_url.clone()),
            method: patch.method.unwrap_or_else(|| self.method.clone()),
            encoding: patch.encoding.unwrap_or_else(|| self.encoding.clone()),
            form_fields: patch.form_fields.unwrap_or_else(|| self.form_fields.clone()),
            payload_form_field: patch
                .payload_form_field
                .unwrap_or_else(|| self.payload_form_field.clone()),
        }
    }

    /// Serializes back to subscription-record shape.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "callback_url": self.callback_url,
            "method": self.method,
            "encoding": self.encoding,
            "form_fields": self.form_fields,
            "payload_form_field": self.payload_form_field,
        })
    }

    /// Parsed body encoding.
    pub fn body_encoding(&self) -> Result<BodyEncoding> {
        self.encoding.parse()
    }

    /// Shapes a JSON payload into the body this endpoint expects.
    ///
    /// For JSON the payload is the body. For multipart the body is an
    /// object of the static form fields plus the serialized payload under
    /// `payload_form_field`.
    pub fn notification_body(&self, payload: &Value) -> Result<Value> {
        match self.body_encoding()? {
            BodyEncoding::Json => Ok(payload.clone()),
            BodyEncoding::MultipartFormData => {
                let mut body: Map<String, Value> = self
                    .form_fields
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                    .collect();
                body.insert(self.payload_form_field.clone(), Value::String(payload.to_string()));
                Ok(Value::Object(body))
            },
        }
    }
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}

fn default_payload_form_field() -> String {
    DEFAULT_PAYLOAD_FORM_FIELD.to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn subscription_defaults_applied() {
        let endpoint =
            Endpoint::from_subscription(&record(json!({"callback_url": "https://a.example/cb"})))
                .unwrap();
        assert_eq!(endpoint, Endpoint::new("https://a.example/cb"));
        assert_eq!(endpoint.method, "POST");
        assert_eq!(endpoint.encoding, "application/json");
        assert_eq!(endpoint.payload_form_field, "payload");
    }

    #[test]
    fn unrecognized_subscription_fields_ignored() {
        let endpoint = Endpoint::from_subscription(&record(json!({
            "callback_url": "https://a.example/cb",
            "owner": "someone@example.com",
            "es_query": {"match_all": {}},
            "hmac_secret_key": "secret",
            "method": "PUT",
        })))
        .unwrap();
        assert_eq!(endpoint.method, "PUT");
        assert!(!endpoint.to_value().to_string().contains("secret"));
    }

    #[test]
    fn wrongly_typed_fields_rejected() {
        let error = Endpoint::from_subscription(&record(json!({"form_fields": ["a"]})));
        assert!(matches!(error, Err(NotifyError::InvalidSubscription { .. })));
    }

    #[test]
    fn extend_replaces_only_patched_fields() {
        let base = Endpoint::new("https://a.example/cb");
        let extended = base.extend(EndpointPatch {
            encoding: Some("multipart/form-data".to_string()),
            ..EndpointPatch::default()
        });
        assert_eq!(extended.callback_url, base.callback_url);
        assert_eq!(extended.encoding, "multipart/form-data");
        assert_eq!(base.encoding, "application/json");
    }

    #[test]
    fn value_round_trips_through_subscription() {
        let mut endpoint = Endpoint::new("https://a.example/cb");
        endpoint.form_fields.insert("foo".to_string(), "bar".to_string());
        let value = endpoint.to_value();
        let parsed = Endpoint::from_subscription(value.as_object().unwrap()).unwrap();
        assert_eq!(parsed, endpoint);
    }

    #[test]
    fn json_body_is_payload() {
        let payload = json!({"bundle_uuid": "b1"});
        let body = Endpoint::new("https://a.example").notification_body(&payload).unwrap();
        assert_eq!(body, payload);
    }

    #[test]
    fn multipart_body_wraps_payload() {
        let mut endpoint = Endpoint::new("https://a.example");
        endpoint.encoding = "multipart/form-data".to_string();
        endpoint.payload_form_field = "match".to_string();
        endpoint.form_fields.insert("foo".to_string(), "bar".to_string());

        let body = endpoint.notification_body(&json!({"a": 1})).unwrap();
        assert_eq!(body, json!({"foo": "bar", "match": "{\"a\":1}"}));
    }

    #[test]
    fn unknown_encoding_rejected() {
        let mut endpoint = Endpoint::new("https://a.example");
        endpoint.encoding = "text/plain".to_string();
        assert_eq!(
            endpoint.notification_body(&json!({})),
            Err(NotifyError::UnsupportedEncoding("text/plain".to_string()))
        );
    }
}
