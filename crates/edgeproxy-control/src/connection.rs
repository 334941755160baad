//! Agent connection handles
//!
//! An [`AgentConnection`] is the sending half of one agent's duplex
//! connection. Frames are queued on a channel drained by a single writer task
//! owned by the transport, so concurrent relays never interleave partial
//! writes. The receiving half is consumed by an
//! [`AgentReader`](crate::AgentReader) as a stream of [`WireFrame`]s.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::RelayError;

/// Capacity of the per-connection outbound frame queue
pub const FRAME_QUEUE_CAPACITY: usize = 256;

/// Transport-agnostic inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Bytes),
    /// Ping or pong; carries no data but proves the peer is alive
    Keepalive,
    /// The peer closed the connection
    Close,
}

/// Represents an active agent connection
#[derive(Debug)]
pub struct AgentConnection {
    connection_id: String,
    /// Identifier the agent presented in its connect path (not used for routing)
    agent_label: String,
    connected_at: chrono::DateTime<chrono::Utc>,
    frame_tx: mpsc::Sender<String>,
    closed: AtomicBool,
}

impl AgentConnection {
    /// Create a connection handle and the receiver its writer task drains
    pub fn new(agent_label: impl Into<String>) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);

        let connection = Arc::new(Self {
            connection_id: format!("ws-{}", uuid::Uuid::new_v4()),
            agent_label: agent_label.into(),
            connected_at: chrono::Utc::now(),
            frame_tx,
            closed: AtomicBool::new(false),
        });

        (connection, frame_rx)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn agent_label(&self) -> &str {
        &self.agent_label
    }

    pub fn connected_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.connected_at
    }

    /// Queue a text frame for the writer task
    ///
    /// Fails once the connection has been marked closed or its writer has
    /// gone away.
    pub async fn send_frame(&self, frame: String) -> Result<(), RelayError> {
        if self.is_closed() {
            return Err(RelayError::Transport(format!(
                "connection {} is closed",
                self.connection_id
            )));
        }

        self.frame_tx.send(frame).await.map_err(|_| {
            self.mark_closed();
            RelayError::Transport(format!(
                "connection {} writer has shut down",
                self.connection_id
            ))
        })
    }

    pub fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(connection_id = %self.connection_id, "Agent connection marked closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.frame_tx.is_closed()
    }
}
