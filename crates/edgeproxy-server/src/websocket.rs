//! Agent WebSocket endpoint
//!
//! Each upgraded socket becomes one pooled [`AgentConnection`]: a writer task
//! drains the connection's frame queue into the socket while the
//! [`AgentReader`](edgeproxy_control::AgentReader) consumes inbound frames.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use axum::body::Bytes;
use edgeproxy_control::{AgentConnection, Dispatcher, TransportPool, WireFrame};
use futures::{Sink, SinkExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::AppState;

/// `GET /edge/ws/{agent_id}`
///
/// The path identifier is only recorded for logging; all agents are pooled
/// uniformly.
pub async fn agent_socket(
    ws: WebSocketUpgrade,
    Path(agent_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let (ping_interval, idle_timeout) = (state.ping_interval, state.idle_timeout);
    ws.on_upgrade(move |socket| {
        serve_agent(socket, agent_id, dispatcher, ping_interval, idle_timeout)
    })
}

/// Run one agent connection until it closes
pub async fn serve_agent(
    socket: WebSocket,
    agent_id: String,
    dispatcher: Dispatcher,
    ping_interval: Duration,
    idle_timeout: Duration,
) {
    let (sink, source) = socket.split();
    let (connection, frame_rx) = AgentConnection::new(agent_id);

    info!(
        connection_id = %connection.connection_id(),
        agent = %connection.agent_label(),
        "Agent connected"
    );

    let writer = tokio::spawn(write_frames(
        sink,
        frame_rx,
        connection.clone(),
        dispatcher.pool().clone(),
        ping_interval,
    ));
    let reader = dispatcher
        .attach(connection.clone())
        .with_idle_timeout(idle_timeout);

    let frames = source.map(|message| match message {
        Ok(Message::Text(text)) => Ok(WireFrame::Text(text.as_str().to_owned())),
        Ok(Message::Binary(data)) => Ok(WireFrame::Binary(data)),
        Ok(Message::Close(_)) => Ok(WireFrame::Close),
        // axum answers pings itself; both still count as traffic
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Ok(WireFrame::Keepalive),
        Err(e) => Err(e),
    });
    let summary = reader.run(frames).await;

    writer.abort();
    info!(
        connection_id = %connection.connection_id(),
        delivered = summary.delivered,
        "Agent disconnected"
    );
}

/// Single writer for one agent socket
///
/// Also pings the agent every `ping_interval`. A failed send evicts the
/// connection from the pool so no further relays pick it.
async fn write_frames<S>(
    mut sink: S,
    mut frame_rx: mpsc::Receiver<String>,
    connection: Arc<AgentConnection>,
    pool: TransportPool,
    ping_interval: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let mut ping = tokio::time::interval_at(
        tokio::time::Instant::now() + ping_interval,
        ping_interval,
    );

    loop {
        let message = tokio::select! {
            frame = frame_rx.recv() => match frame {
                Some(frame) => Message::Text(frame.into()),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        if let Err(e) = sink.send(message).await {
            error!(
                connection_id = %connection.connection_id(),
                error = %e,
                "WebSocket send error, removing connection"
            );
            connection.mark_closed();
            pool.unregister(connection.connection_id());
            break;
        }
    }

    debug!(connection_id = %connection.connection_id(), "Agent writer task ended");
    connection.mark_closed();
    let _ = sink.close().await;
}
