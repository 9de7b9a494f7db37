//! HMAC-SHA256 request signatures in the draft-cavage HTTP Signatures
//! format.
//!
//! The signer adds `Date` and (for non-empty bodies) `Digest` headers, then
//! signs `(request-target) host date [digest]` and puts the result in the
//! `Authorization` header. The `host` line comes from the `Host` header
//! when present, otherwise from the URL.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::{
    header::{AUTHORIZATION, DATE, HOST},
    HeaderMap, HeaderName, HeaderValue, Method,
};
use sha2::{Digest as _, Sha256};
use url::Url;

use crate::error::{NotifyError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Name of the body digest header.
pub const DIGEST: HeaderName = HeaderName::from_static("digest");

/// Signs outgoing requests with a shared secret.
#[derive(Clone)]
pub struct HttpSignature {
    key: Vec<u8>,
    key_id: Option<String>,
}

impl std::fmt::Debug for HttpSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSignature").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

impl HttpSignature {
    /// Signer for `key`. Without `key_id` the `keyId` parameter is empty.
    pub fn new(key: impl Into<Vec<u8>>, key_id: Option<String>) -> Self {
        Self { key: key.into(), key_id }
    }

    /// Adds `Date`, `Digest` and `Authorization` headers for the request.
    pub fn sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &mut HeaderMap,
        body: &[u8],
        date: DateTime<Utc>,
    ) -> Result<()> {
        let date = date.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert(DATE, header_value(&date)?);

        let mut signed = vec!["(request-target)", "host", "date"];
        if !body.is_empty() {
            let digest = format!("SHA-256={}", STANDARD.encode(Sha256::digest(body)));
            headers.insert(DIGEST, header_value(&digest)?);
            signed.push("digest");
        }

        let signing_string = signing_string(method, url, headers, &signed)?;
        let signature = STANDARD.encode(self.mac(signing_string.as_bytes())?.finalize().into_bytes());

        let authorization = format!(
            "Signature keyId=\"{}\",algorithm=\"hmac-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id.as_deref().unwrap_or_default(),
            signed.join(" "),
            signature
        );
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(())
    }

    /// Checks the `Authorization` signature of a received request.
    ///
    /// Returns `false` for a missing or malformed header, a digest that
    /// does not match the body, or a signature made with a different key.
    pub fn verify(&self, method: &Method, url: &Url, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(params) = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Signature "))
            .map(parse_params)
        else {
            return false;
        };
        let (Some(signed), Some(signature)) = (param(&params, "headers"), param(&params, "signature"))
        else {
            return false;
        };

        let signed: Vec<&str> = signed.split(' ').collect();
        if signed.contains(&"digest") {
            let expected = format!("SHA-256={}", STANDARD.encode(Sha256::digest(body)));
            if headers.get(DIGEST).and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
                return false;
            }
        }

        let Ok(signing_string) = signing_string(method, url, headers, &signed) else {
            return false;
        };
        let Ok(signature) = STANDARD.decode(signature) else {
            return false;
        };
        self.mac(signing_string.as_bytes())
            .map(|mac| mac.verify_slice(&signature).is_ok())
            .unwrap_or(false)
    }

    fn mac(&self, message: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| NotifyError::Signing { message: e.to_string() })?;
        mac.update(message);
        Ok(mac)
    }
}

fn signing_string(method: &Method, url: &Url, headers: &HeaderMap, signed: &[&str]) -> Result<String> {
    let mut lines = Vec::with_capacity(signed.len());
    for name in signed {
        let value = match *name {
            "(request-target)" => {
                let mut target = format!("{} {}", method.as_str().to_lowercase(), url.path());
                if let Some(query) = url.query() {
                    target.push('?');
                    target.push_str(query);
                }
                target
            },
            "host" => headers
                .get(HOST)
                .and_then(|v| v.to_str().ok())
                .map_or_else(|| host_header(url), str::to_string),
            other => headers
                .get(other)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| NotifyError::Signing { message: format!("missing header {other}") })?
                .to_string(),
        };
        lines.push(format!("{name}: {value}"));
    }
    Ok(lines.join("\n"))
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn parse_params(header: &str) -> Vec<(String, String)> {
    header
        .split(',')
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            Some((key.to_string(), value.trim_matches('"').to_string()))
        })
        .collect()
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| NotifyError::Signing { message: e.to_string() })
}
