//! Ingress request and response bodies

use edgeproxy_proto::{HttpMethod, HttpRequestPayload, StringMap};
use serde::{Deserialize, Serialize};

/// Body of `POST /proxy`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: StringMap,
    #[serde(default)]
    pub cookies: StringMap,
    #[serde(default)]
    pub params: StringMap,
    #[serde(default)]
    pub body: String,
}

impl From<ProxyRequest> for HttpRequestPayload {
    fn from(request: ProxyRequest) -> Self {
        HttpRequestPayload {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body,
            params: request.params,
            cookies: request.cookies,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Connected agents
    pub agents: usize,
    /// Relays waiting for an agent reply
    pub pending_requests: usize,
    /// One entry per pooled connection
    #[serde(default)]
    pub connections: Vec<AgentInfo>,
}

/// A pooled agent connection as reported by `/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub connection_id: String,
    /// Identifier from the agent's connect path
    pub agent: String,
    /// RFC 3339 timestamp
    pub connected_at: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
