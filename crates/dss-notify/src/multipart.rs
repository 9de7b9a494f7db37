//! `multipart/form-data` bodies for form-encoded callbacks.

use rand::RngCore;
use serde_json::{Map, Value};

/// Encoded multipart body and its full `Content-Type` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    /// `multipart/form-data; boundary=...`
    pub content_type: String,
    /// Encoded parts followed by the closing boundary.
    pub body: Vec<u8>,
}

/// Encodes each entry of `fields` as one form part with a random boundary.
pub fn encode_form_data(fields: &Map<String, Value>) -> MultipartBody {
    let mut raw = [0u8; 16];
    rand::rng().fill_bytes(&mut raw);
    encode_with_boundary(fields, &hex::encode(raw))
}

fn encode_with_boundary(fields: &Map<String, Value>, boundary: &str) -> MultipartBody {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape_name(name))
                .as_bytes(),
        );
        match value {
            Value::String(s) => body.extend_from_slice(s.as_bytes()),
            other => body.extend_from_slice(other.to_string().as_bytes()),
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    MultipartBody { content_type: format!("multipart/form-data; boundary={boundary}"), body }
}

/// Escapes a part name for a quoted header parameter the way HTML5 form
/// submission does: `"` becomes `%22`, `\` is doubled and control
/// characters other than ESC are percent-encoded.
fn escape_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '"' => escaped.push_str("%22"),
            '\\' => escaped.push_str("\\\\"),
            '\u{1b}' => escaped.push(c),
            c if u32::from(c) < 0x20 => escaped.push_str(&format!("%{:02X}", u32::from(c))),
            c => escaped.push(c),
        }
    }
    escaped
}
