// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redaction of sensitive headers and body fields before they reach logs.
//!
//! The logging stage only depends on the [`Masker`] trait; [`KeyMasker`] is
//! the default implementation and redacts by (case-insensitive) key name.

use http::HeaderMap;
use serde_json::{Map, Value};

/// Replacement written in place of a redacted value.
pub const REDACTED: &str = "[REDACTED]";

/// Produces redacted copies of headers and decoded bodies.
pub trait Masker: Send + Sync {
    /// Render headers as `{"name": ["value", ...]}` with sensitive values redacted.
    fn mask_headers(&self, headers: &HeaderMap) -> Value;

    /// Return a redacted copy of a decoded JSON body.
    fn mask_body(&self, body: &Value) -> Value;
}

/// Redacts any header or JSON object key contained in its key list.
#[derive(Debug, Clone)]
pub struct KeyMasker {
    sensitive_headers: Vec<String>,
    sensitive_fields: Vec<String>,
}

impl Default for KeyMasker {
    fn default() -> Self {
        Self {
            sensitive_headers: vec![
                "authorization".to_string(),
                "proxy-authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
                "x-api-key".to_string(),
                "x-auth-token".to_string(),
            ],
            sensitive_fields: vec![
                "password".to_string(),
                "secret".to_string(),
                "token".to_string(),
                "access_token".to_string(),
                "refresh_token".to_string(),
                "api_key".to_string(),
                "credit_card".to_string(),
                "card_number".to_string(),
                "cvv".to_string(),
            ],
        }
    }
}

impl KeyMasker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A masker that redacts nothing.
    #[must_use]
    pub fn none() -> Self {
        Self {
            sensitive_headers: Vec::new(),
            sensitive_fields: Vec::new(),
        }
    }

    /// Add a sensitive header to redact.
    #[must_use]
    pub fn with_sensitive_header(mut self, header: impl Into<String>) -> Self {
        self.sensitive_headers.push(header.into());
        self
    }

    /// Add a sensitive body field to redact, at any nesting depth.
    #[must_use]
    pub fn with_sensitive_field(mut self, field: impl Into<String>) -> Self {
        self.sensitive_fields.push(field.into());
        self
    }

    fn is_sensitive_header(&self, name: &str) -> bool {
        self.sensitive_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(name))
    }

    fn is_sensitive_field(&self, key: &str) -> bool {
        self.sensitive_fields
            .iter()
            .any(|f| f.eq_ignore_ascii_case(key))
    }

    fn mask_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let masked = if self.is_sensitive_field(k) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.mask_value(v)
                        };
                        (k.clone(), masked)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.mask_value(v)).collect()),
            other => other.clone(),
        }
    }
}

impl Masker for KeyMasker {
    fn mask_headers(&self, headers: &HeaderMap) -> Value {
        let mut out = Map::new();
        for name in headers.keys() {
            let values = if self.is_sensitive_header(name.as_str()) {
                vec![Value::String(REDACTED.to_string())]
            } else {
                headers
                    .get_all(name)
                    .iter()
                    .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
                    .collect()
            };
            out.insert(name.as_str().to_string(), Value::Array(values));
        }
        Value::Object(out)
    }

    fn mask_body(&self, body: &Value) -> Value {
        self.mask_value(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        headers.insert("x-test-req", "req-header-val".parse().unwrap());
        headers.append("accept", "application/json".parse().unwrap());
        headers.append("accept", "text/plain".parse().unwrap());

        let masked = KeyMasker::default().mask_headers(&headers);

        assert_eq!(masked["authorization"], json!([REDACTED]));
        assert_eq!(masked["x-test-req"], json!(["req-header-val"]));
        assert_eq!(masked["accept"], json!(["application/json", "text/plain"]));
    }

    #[test]
    fn test_mask_nested_body() {
        let body = json!({
            "user": {"name": "alice", "Password": "hunter2"},
            "cards": [{"card_number": "4111", "brand": "visa"}],
            "token": "abc"
        });

        let masked = KeyMasker::default().mask_body(&body);

        assert_eq!(masked["user"]["name"], "alice");
        assert_eq!(masked["user"]["Password"], REDACTED);
        assert_eq!(masked["cards"][0]["card_number"], REDACTED);
        assert_eq!(masked["cards"][0]["brand"], "visa");
        assert_eq!(masked["token"], REDACTED);
    }

    #[test]
    fn test_custom_keys() {
        let masker = KeyMasker::none()
            .with_sensitive_header("X-Tenant-Secret")
            .with_sensitive_field("ssn");

        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-secret", "s".parse().unwrap());
        headers.insert("authorization", "Bearer visible".parse().unwrap());
        let masked = masker.mask_headers(&headers);
        assert_eq!(masked["x-tenant-secret"], json!([REDACTED]));
        assert_eq!(masked["authorization"], json!(["Bearer visible"]));

        let body = masker.mask_body(&json!({"ssn": "123", "password": "p"}));
        assert_eq!(body["ssn"], REDACTED);
        assert_eq!(body["password"], "p");
    }

    #[test]
    fn test_scalars_pass_through() {
        let masker = KeyMasker::default();
        assert_eq!(masker.mask_body(&json!("plain")), json!("plain"));
        assert_eq!(masker.mask_body(&json!(null)), json!(null));
    }
}
