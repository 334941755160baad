//! Wire envelope types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::codec::{self, CodecError};

/// Header, query and cookie maps as they travel on the wire
pub type StringMap = HashMap<String, String>;

/// HTTP methods an agent is allowed to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound HTTP request the agent should perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestPayload {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: StringMap,
    #[serde(default)]
    pub body: String,
    /// Query parameters appended to `url` by the agent
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: StringMap,
    /// Cookies sent as a single `Cookie` header by the agent
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cookies: StringMap,
}

impl HttpRequestPayload {
    /// Create a request with no headers, body, params or cookies
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: StringMap::new(),
            body: String::new(),
            params: StringMap::new(),
            cookies: StringMap::new(),
        }
    }
}

/// Result of the agent's HTTP request
///
/// Upstream failures are also carried here (with a 502-class status), so a
/// payload never signals a broker-level error on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponsePayload {
    pub status_code: u16,
    #[serde(default)]
    pub headers: StringMap,
    #[serde(default)]
    pub body: String,
}

impl HttpResponsePayload {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: StringMap::new(),
            body: body.into(),
        }
    }

    /// Reply an agent sends when the upstream request could not be completed
    pub fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(crate::UPSTREAM_FAILURE_STATUS, detail)
    }

    /// Look up a header by name, ignoring ASCII case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Coordinator -> agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    pub request_id: String,
    pub payload: HttpRequestPayload,
}

impl DispatchEnvelope {
    pub fn new(request_id: impl Into<String>, payload: HttpRequestPayload) -> Self {
        Self {
            request_id: request_id.into(),
            payload,
        }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        codec::encode(self)
    }

    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        codec::decode(frame)
    }
}

/// Agent -> coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub request_id: String,
    pub payload: HttpResponsePayload,
}

impl ReplyEnvelope {
    pub fn new(request_id: impl Into<String>, payload: HttpResponsePayload) -> Self {
        Self {
            request_id: request_id.into(),
            payload,
        }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        codec::encode(self)
    }

    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        codec::decode(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_wire_format() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");

        let parsed: HttpMethod = serde_json::from_str("\"POST\"").unwrap();
        assert_eq!(parsed, HttpMethod::Post);

        assert!(serde_json::from_str::<HttpMethod>("\"PATCH\"").is_err());
    }

    #[test]
    fn test_dispatch_wire_shape() {
        let mut payload = HttpRequestPayload::new(HttpMethod::Get, "http://10.0.0.5/status");
        payload
            .headers
            .insert("Accept".to_string(), "application/json".to_string());

        let frame = DispatchEnvelope::new("abc", payload).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["request_id"], "abc");
        assert_eq!(value["payload"]["method"], "GET");
        assert_eq!(value["payload"]["url"], "http://10.0.0.5/status");
        assert_eq!(value["payload"]["headers"]["Accept"], "application/json");
        assert_eq!(value["payload"]["body"], "");
        // Empty supplements stay off the wire
        assert!(value["payload"].get("params").is_none());
        assert!(value["payload"].get("cookies").is_none());
    }

    #[test]
    fn test_reply_defaults_optional_maps() {
        let reply =
            ReplyEnvelope::decode(r#"{"request_id":"r1","payload":{"status_code":204}}"#).unwrap();

        assert_eq!(reply.request_id, "r1");
        assert_eq!(reply.payload.status_code, 204);
        assert!(reply.payload.headers.is_empty());
        assert!(reply.payload.body.is_empty());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut payload = HttpResponsePayload::new(200, "{}");
        payload
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());

        assert_eq!(payload.content_type(), Some("application/json"));
        assert_eq!(payload.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(payload.header("x-missing"), None);
    }

    #[test]
    fn test_bad_gateway() {
        let payload = HttpResponsePayload::bad_gateway("HTTP request failed: refused");
        assert_eq!(payload.status_code, 502);
        assert_eq!(payload.body, "HTTP request failed: refused");
    }
}
