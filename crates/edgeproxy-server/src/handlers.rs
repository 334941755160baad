use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use edgeproxy_control::RelayError;
use edgeproxy_proto::{strip_hop_by_hop, HttpRequestPayload, HttpResponsePayload};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{AgentInfo, ErrorResponse, HealthResponse, ProxyRequest};
use crate::AppState;

/// Content type used when the agent reply does not carry one
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Relay a request through one of the connected agents
///
/// The agent's reply is returned as-is, including upstream failures it
/// reports (e.g. 502). Broker failures map to 400 (no agent), 502 (agent
/// connection lost while sending) and 504 (no reply in time).
pub async fn proxy_request(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProxyRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let method = request.method;
    let url = request.url.clone();

    let reply = state
        .dispatcher
        .relay_default(HttpRequestPayload::from(request))
        .await
        .map_err(|e| {
            warn!(method = %method, url = %url, error = %e, "Relay failed");
            relay_error_response(&e)
        })?;

    info!(
        method = %method,
        url = %url,
        status = reply.status_code,
        "Relayed request"
    );

    Ok(reply_into_response(reply))
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let connections: Vec<AgentInfo> = state
        .dispatcher
        .pool()
        .list()
        .iter()
        .map(|connection| AgentInfo {
            connection_id: connection.connection_id().to_string(),
            agent: connection.agent_label().to_string(),
            connected_at: connection.connected_at().to_rfc3339(),
        })
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        agents: connections.len(),
        pending_requests: state.dispatcher.pending().count(),
        connections,
    })
}

/// Map a broker failure to the response the caller sees
pub fn relay_error_response(error: &RelayError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match error {
        RelayError::NoAgentsAvailable => (StatusCode::BAD_REQUEST, "NO_AGENTS_AVAILABLE"),
        RelayError::Transport(_) => (StatusCode::BAD_GATEWAY, "AGENT_TRANSPORT_ERROR"),
        RelayError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "RELAY_TIMEOUT"),
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: Some(code.to_string()),
        }),
    )
}

/// Turn an agent reply into the HTTP response delivered to the caller
///
/// Hop-by-hop headers are removed here even though agents already strip
/// them, so they never reach the caller whatever the agent sent.
pub fn reply_into_response(reply: HttpResponsePayload) -> Response {
    let HttpResponsePayload {
        status_code,
        mut headers,
        body,
    } = reply;

    let status = StatusCode::from_u16(status_code).unwrap_or_else(|_| {
        warn!(status = status_code, "Agent replied with invalid status code");
        StatusCode::BAD_GATEWAY
    });
    strip_hop_by_hop(&mut headers);

    let mut response = (status, body).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
    );

    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                response_headers.insert(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid header from agent reply"),
        }
    }

    response
}
