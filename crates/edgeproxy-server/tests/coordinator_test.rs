//! Coordinator integration tests
//!
//! A real coordinator is bound to a local port; fake agents connect with
//! tokio-tungstenite and answer dispatches by hand.

use edgeproxy_proto::{DispatchEnvelope, HttpMethod, HttpResponsePayload, ReplyEnvelope};
use edgeproxy_server::{Coordinator, CoordinatorConfig, SelectionKind};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type AgentSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_coordinator(relay_timeout: Duration) -> SocketAddr {
    start_coordinator_with(CoordinatorConfig {
        relay_timeout,
        ..CoordinatorConfig::default()
    })
    .await
}

async fn start_coordinator_with(config: CoordinatorConfig) -> SocketAddr {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let coordinator = Coordinator::new(CoordinatorConfig {
        listen_addr: addr,
        selection: SelectionKind::Random,
        ..config
    });
    tokio::spawn(async move {
        coordinator.serve(listener).await.unwrap();
    });

    addr
}

async fn connect_agent(addr: SocketAddr, agent_id: &str) -> AgentSocket {
    let url = format!("ws://{}/edge/ws/{}", addr, agent_id);
    let (socket, _response) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

async fn health(addr: SocketAddr) -> serde_json::Value {
    reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn agent_count(addr: SocketAddr) -> usize {
    health(addr).await["agents"].as_u64().unwrap() as usize
}

/// Poll the health endpoint until the pool has `expected` agents
async fn wait_for_agents(addr: SocketAddr, expected: usize) {
    for _ in 0..100 {
        if agent_count(addr).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pool never reached {} agents", expected);
}

async fn next_dispatch(socket: &mut AgentSocket) -> DispatchEnvelope {
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => return DispatchEnvelope::decode(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn send_reply(socket: &mut AgentSocket, request_id: String, payload: HttpResponsePayload) {
    let frame = ReplyEnvelope::new(request_id, payload).encode().unwrap();
    socket.send(Message::Text(frame)).await.unwrap();
}

fn proxy_body(url: &str) -> serde_json::Value {
    serde_json::json!({
        "url": url,
        "method": "POST",
        "headers": { "Accept": "application/json" },
        "params": { "page": "2" },
        "body": "{\"hello\":\"edge\"}"
    })
}

#[tokio::test]
async fn test_proxy_without_agents_is_client_error() {
    let addr = start_coordinator(Duration::from_secs(60)).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/proxy", addr))
        .json(&proxy_body("http://10.0.0.8/api"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "NO_AGENTS_AVAILABLE");
}

#[tokio::test]
async fn test_proxy_returns_agent_reply_verbatim() {
    let addr = start_coordinator(Duration::from_secs(10)).await;
    let mut agent = connect_agent(addr, "dev").await;
    wait_for_agents(addr, 1).await;

    let agent_task = tokio::spawn(async move {
        let dispatch = next_dispatch(&mut agent).await;
        assert_eq!(dispatch.payload.method, HttpMethod::Post);
        assert_eq!(dispatch.payload.url, "http://10.0.0.8/api");
        assert_eq!(dispatch.payload.body, "{\"hello\":\"edge\"}");
        assert_eq!(dispatch.payload.params.get("page").map(String::as_str), Some("2"));

        let mut reply = HttpResponsePayload::new(502, "HTTP request failed: connection refused");
        for (name, value) in [
            ("Content-Type", "text/plain"),
            ("X-Upstream", "intranet"),
            ("CONTENT-LENGTH", "12345"),
            ("transfer-encoding", "chunked"),
            ("Keep-Alive", "timeout=5"),
        ] {
            reply.headers.insert(name.to_string(), value.to_string());
        }
        send_reply(&mut agent, dispatch.request_id, reply).await;
        agent
    });

    let response = reqwest::Client::new()
        .post(format!("http://{}/proxy", addr))
        .json(&proxy_body("http://10.0.0.8/api"))
        .send()
        .await
        .unwrap();

    // Upstream failure reported by the agent is passed through, not a broker error
    assert_eq!(response.status().as_u16(), 502);
    let headers = response.headers().clone();
    assert_eq!(headers.get("content-type").unwrap(), "text/plain");
    assert_eq!(headers.get("x-upstream").unwrap(), "intranet");
    assert!(headers.get("transfer-encoding").is_none());
    assert!(headers.get("keep-alive").is_none());
    assert_ne!(headers.get("content-length").unwrap(), "12345");
    assert_eq!(
        response.text().await.unwrap(),
        "HTTP request failed: connection refused"
    );

    drop(agent_task.await.unwrap());
}

#[tokio::test]
async fn test_malformed_agent_frames_are_skipped() {
    let addr = start_coordinator(Duration::from_secs(10)).await;
    let mut agent = connect_agent(addr, "noisy").await;
    wait_for_agents(addr, 1).await;

    let agent_task = tokio::spawn(async move {
        let dispatch = next_dispatch(&mut agent).await;
        agent
            .send(Message::Text("definitely not json".to_string()))
            .await
            .unwrap();
        agent
            .send(Message::Text(r#"{"payload":{"status_code":200}}"#.to_string()))
            .await
            .unwrap();
        send_reply(
            &mut agent,
            dispatch.request_id,
            HttpResponsePayload::new(200, "eventually"),
        )
        .await;
        agent
    });

    let response = reqwest::Client::new()
        .post(format!("http://{}/proxy", addr))
        .json(&proxy_body("http://10.0.0.8/api"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "eventually");
    let agent = agent_task.await.unwrap();
    assert_eq!(agent_count(addr).await, 1);
    drop(agent);
}

#[tokio::test]
async fn test_agent_disconnect_leaves_relay_to_its_timeout() {
    let timeout = Duration::from_millis(500);
    let addr = start_coordinator(timeout).await;
    let mut agent = connect_agent(addr, "flaky").await;
    wait_for_agents(addr, 1).await;

    let agent_task = tokio::spawn(async move {
        next_dispatch(&mut agent).await;
        agent.close(None).await.unwrap();
    });

    let started = std::time::Instant::now();
    let response = reqwest::Client::new()
        .post(format!("http://{}/proxy", addr))
        .json(&proxy_body("http://10.0.0.8/slow"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 504);
    assert!(started.elapsed() >= timeout);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "RELAY_TIMEOUT");

    agent_task.await.unwrap();
    wait_for_agents(addr, 0).await;
}

#[tokio::test]
async fn test_agents_with_same_id_are_pooled_separately() {
    let addr = start_coordinator(Duration::from_secs(10)).await;
    let first = connect_agent(addr, "dev").await;
    let second = connect_agent(addr, "dev").await;
    wait_for_agents(addr, 2).await;

    drop(first);
    wait_for_agents(addr, 1).await;
    drop(second);
    wait_for_agents(addr, 0).await;
}

#[tokio::test]
async fn test_health_lists_connected_agents() {
    let addr = start_coordinator(Duration::from_secs(10)).await;
    let _office = connect_agent(addr, "office").await;
    wait_for_agents(addr, 1).await;

    let health = health(addr).await;
    let connections = health["connections"].as_array().unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0]["agent"], "office");
    assert!(connections[0]["connection_id"]
        .as_str()
        .unwrap()
        .starts_with("ws-"));
    assert!(!connections[0]["connected_at"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_unresponsive_agent_is_dropped_but_live_agent_stays() {
    let addr = start_coordinator_with(CoordinatorConfig {
        ping_interval: Duration::from_millis(100),
        idle_timeout: Duration::from_millis(400),
        ..CoordinatorConfig::default()
    })
    .await;

    // Never polled after the handshake, so it never answers a ping
    let silent = connect_agent(addr, "half-open").await;
    wait_for_agents(addr, 1).await;
    wait_for_agents(addr, 0).await;

    // Reading keeps answering pings, so this one survives several idle periods
    let mut live = connect_agent(addr, "live").await;
    wait_for_agents(addr, 1).await;
    let reader = tokio::spawn(async move {
        while let Some(Ok(_)) = live.next().await {}
    });
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(agent_count(addr).await, 1);

    reader.abort();
    drop(silent);
}
