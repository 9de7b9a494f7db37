//! Versioned task-request wire protocol.
//!
//! A task request is a JSON object:
//!
//! ```json
//! { "client_name": "fast-test-client", "protocol_version": 1, "task_id": "…", "state": {} }
//! ```
//!
//! Encoding is pure. Decoding validates presence, registry membership and
//! version range, and reports each failure category separately so the
//! dispatcher can audit it under the right key.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{error::ProtocolError, registry::TaskRegistration};

/// Key of the client name field.
pub const CLIENT_KEY: &str = "client_name";
/// Key of the protocol version field.
pub const REQUEST_VERSION_KEY: &str = "protocol_version";
/// Key of the task identifier field.
pub const TASK_ID_KEY: &str = "task_id";
/// Key of the opaque task state field.
pub const STATE_KEY: &str = "state";

/// Version stamped on newly encoded requests.
pub const CURRENT_VERSION: i64 = 1;
/// Oldest version a dispatcher accepts.
pub const MIN_SUPPORTED_VERSION: i64 = 1;
/// Newest version a dispatcher accepts.
pub const MAX_SUPPORTED_VERSION: i64 = 1;

/// Audit stream used when a message carries no task id.
pub const FALLBACK_LOG_STREAM_NAME: &str = "chunkedtask-fallback";

/// Identifier of a scheduled task.
///
/// The scheduler generates UUID v4 strings, but on the wire the id is opaque
/// and any string is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a new random task id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A task request as carried on the worker topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Registered client (task type) name.
    pub client_name: String,
    /// Protocol version the request was encoded with.
    pub protocol_version: i64,
    /// Task identifier.
    pub task_id: TaskId,
    /// Opaque task state handed to the task factory.
    pub state: Value,
}

impl TaskRequest {
    /// Returns the request as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            CLIENT_KEY: self.client_name,
            REQUEST_VERSION_KEY: self.protocol_version,
            TASK_ID_KEY: self.task_id,
            STATE_KEY: self.state,
        })
    }
}

/// A validated request together with the registry entry it resolved to.
#[derive(Debug, Clone)]
pub struct DecodedRequest {
    /// The validated request.
    pub request: TaskRequest,
    /// Registry entry for `request.client_name`.
    pub registration: &'static TaskRegistration,
}

/// Builds a task request stamped with [`CURRENT_VERSION`].
pub fn encode(client_name: impl Into<String>, task_id: TaskId, state: Value) -> TaskRequest {
    TaskRequest {
        client_name: client_name.into(),
        protocol_version: CURRENT_VERSION,
        task_id,
        state,
    }
}

/// Parses and validates a task request against `registry`.
///
/// # Errors
///
/// - `MalformedPayload` if the payload is not a JSON object
/// - `MissingTaskId` if `task_id` is absent
/// - `MissingFields` if `client_name`, `protocol_version` or `state` is
///   absent, or `client_name`/`protocol_version` has the wrong type
/// - `UnknownClient` if the client name is not registered
/// - `UnsupportedVersion` if the version is outside
///   `MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION`
pub fn decode(
    payload: &Value,
    registry: &'static [TaskRegistration],
) -> Result<DecodedRequest, ProtocolError> {
    let Some(object) = payload.as_object() else {
        return Err(ProtocolError::MalformedPayload { reason: json_kind(payload).to_string() });
    };

    let task_id = match object.get(TASK_ID_KEY) {
        None => return Err(ProtocolError::MissingTaskId),
        Some(Value::String(id)) => TaskId::from(id.as_str()),
        Some(other) => TaskId::from(other.to_string()),
    };

    let missing: Vec<String> = [CLIENT_KEY, REQUEST_VERSION_KEY, STATE_KEY]
        .into_iter()
        .filter(|key| !object.contains_key(*key))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ProtocolError::MissingFields { task_id, fields: missing });
    }

    let (client_name, version) = typed_fields(object, &task_id)?;

    let Some(registration) = crate::registry::lookup(registry, client_name) else {
        return Err(ProtocolError::UnknownClient { task_id, client_name: client_name.to_string() });
    };

    if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
        return Err(ProtocolError::UnsupportedVersion { task_id, version });
    }

    let state = object.get(STATE_KEY).cloned().unwrap_or(Value::Null);

    Ok(DecodedRequest {
        request: TaskRequest {
            client_name: client_name.to_string(),
            protocol_version: version,
            task_id,
            state,
        },
        registration,
    })
}

fn typed_fields<'a>(
    object: &'a Map<String, Value>,
    task_id: &TaskId,
) -> Result<(&'a str, i64), ProtocolError> {
    let client_name = object.get(CLIENT_KEY).and_then(Value::as_str);
    let version = object.get(REQUEST_VERSION_KEY).and_then(Value::as_i64);

    match (client_name, version) {
        (Some(name), Some(version)) => Ok((name, version)),
        (name, version) => {
            let mut fields = Vec::new();
            if name.is_none() {
                fields.push(CLIENT_KEY.to_string());
            }
            if version.is_none() {
                fields.push(REQUEST_VERSION_KEY.to_string());
            }
            Err(ProtocolError::MissingFields { task_id: task_id.clone(), fields })
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry::{CLIENTS, FAST_TEST_CLIENT_NAME};

    fn valid_payload() -> Value {
        json!({
            "client_name": FAST_TEST_CLIENT_NAME,
            "protocol_version": CURRENT_VERSION,
            "task_id": "t1",
            "state": {"remaining": 2},
        })
    }

    #[test]
    fn encode_stamps_current_version() {
        let request = encode(FAST_TEST_CLIENT_NAME, TaskId::from("t1"), json!({"x": 1}));

        assert_eq!(request.protocol_version, CURRENT_VERSION);
        assert_eq!(
            request.to_value(),
            json!({
                "client_name": FAST_TEST_CLIENT_NAME,
                "protocol_version": CURRENT_VERSION,
                "task_id": "t1",
                "state": {"x": 1},
            })
        );
    }

    #[test]
    fn decode_accepts_encoded_request() {
        let request = encode(FAST_TEST_CLIENT_NAME, TaskId::generate(), json!({"remaining": 1}));

        let decoded = decode(&request.to_value(), CLIENTS).unwrap();

        assert_eq!(decoded.request, request);
        assert_eq!(decoded.registration.client_name, FAST_TEST_CLIENT_NAME);
    }

    #[test]
    fn decode_rejects_missing_task_id() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove(TASK_ID_KEY);

        assert_eq!(decode(&payload, CLIENTS).unwrap_err(), ProtocolError::MissingTaskId);
    }

    #[test]
    fn decode_reports_every_missing_field() {
        let error = decode(&json!({"task_id": "t1"}), CLIENTS).unwrap_err();

        assert_eq!(
            error,
            ProtocolError::MissingFields {
                task_id: TaskId::from("t1"),
                fields: vec![
                    "client_name".to_string(),
                    "protocol_version".to_string(),
                    "state".to_string()
                ],
            }
        );
    }

    #[test]
    fn decode_rejects_non_integer_version() {
        let mut payload = valid_payload();
        payload[REQUEST_VERSION_KEY] = json!("1");

        let error = decode(&payload, CLIENTS).unwrap_err();

        assert!(matches!(
            error,
            ProtocolError::MissingFields { ref fields, .. } if fields == &["protocol_version"]
        ));
    }

    #[test]
    fn decode_rejects_unknown_client() {
        let mut payload = valid_payload();
        payload[CLIENT_KEY] = json!("no-such-client");

        let error = decode(&payload, CLIENTS).unwrap_err();

        assert_eq!(
            error,
            ProtocolError::UnknownClient {
                task_id: TaskId::from("t1"),
                client_name: "no-such-client".to_string(),
            }
        );
    }

    #[test]
    fn decode_rejects_versions_outside_supported_range() {
        for version in [MIN_SUPPORTED_VERSION - 1, MAX_SUPPORTED_VERSION + 1] {
            let mut payload = valid_payload();
            payload[REQUEST_VERSION_KEY] = json!(version);

            let error = decode(&payload, CLIENTS).unwrap_err();

            assert_eq!(
                error,
                ProtocolError::UnsupportedVersion { task_id: TaskId::from("t1"), version }
            );
        }
    }

    #[test]
    fn decode_rejects_non_object_payload() {
        let error = decode(&json!([1, 2, 3]), CLIENTS).unwrap_err();

        assert_eq!(error, ProtocolError::MalformedPayload { reason: "array".to_string() });
    }

    #[test]
    fn null_state_is_present() {
        let mut payload = valid_payload();
        payload[STATE_KEY] = Value::Null;

        let decoded = decode(&payload, CLIENTS).unwrap();
        assert_eq!(decoded.request.state, Value::Null);
    }

    #[test]
    fn generated_task_ids_are_unique() {
        assert_ne!(TaskId::generate(), TaskId::generate());
    }
}
