//! Edge agent connection loop
//!
//! The agent keeps one WebSocket connection to the coordinator open,
//! reconnecting after a fixed delay whenever it drops. Every dispatch runs in
//! its own task; replies from all tasks go through one writer so frames never
//! interleave.

use edgeproxy_proto::{CodecError, DispatchEnvelope, ReplyEnvelope};
use futures_util::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::forwarder::{ForwarderError, HttpForwarder};

/// Default coordinator endpoint
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8000/edge/ws/dev";

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Coordinator WebSocket URL, ending with this agent's identifier
    pub server_url: String,
    /// Timeout applied to each forwarded HTTP request
    pub http_timeout: Duration,
    /// Pause before reconnecting after the connection drops
    pub reconnect_delay: Duration,
    /// Interval between keepalive pings
    pub ping_interval: Duration,
    /// Drop the connection after this long without any frame from the
    /// coordinator, pongs included
    pub idle_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            http_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(25),
        }
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("No traffic from coordinator for {0:?}")]
    IdleTimeout(Duration),

    #[error("Forwarder error: {0}")]
    Forwarder(#[from] ForwarderError),
}

/// Executes coordinator dispatches against the local network
pub struct EdgeAgent {
    config: AgentConfig,
    forwarder: Arc<HttpForwarder>,
}

impl EdgeAgent {
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let forwarder = Arc::new(HttpForwarder::new(config.http_timeout)?);
        Ok(Self { config, forwarder })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Stay connected to the coordinator forever
    pub async fn run(&self) {
        loop {
            info!(url = %self.config.server_url, "Connecting to coordinator");

            match self.connect_once().await {
                Ok(()) => warn!("Connection to coordinator closed, reconnecting..."),
                Err(e) => error!("Connection error: {}", e),
            }

            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    /// Connect once and serve dispatches until the connection ends
    pub async fn connect_once(&self) -> Result<(), AgentError> {
        let (socket, _response) = tokio_tungstenite::connect_async(self.config.server_url.as_str())
            .await
            .map_err(|source| AgentError::Connect {
                url: self.config.server_url.clone(),
                source,
            })?;

        info!("Connected, waiting for proxy requests");
        self.serve(socket).await
    }

    /// Serve dispatches arriving on an established socket
    pub async fn serve<S>(&self, socket: S) -> Result<(), AgentError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>>
            + futures_util::Sink<Message, Error = tungstenite::Error>
            + Send
            + 'static,
    {
        let (mut sink, mut source) = socket.split();
        let (reply_tx, mut reply_rx) = mpsc::channel::<Message>(256);

        let ping_interval = self.config.ping_interval;
        let writer = tokio::spawn(async move {
            let mut ping = tokio::time::interval_at(
                tokio::time::Instant::now() + ping_interval,
                ping_interval,
            );
            loop {
                let message = tokio::select! {
                    message = reply_rx.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                    _ = ping.tick() => Message::Ping(Vec::new()),
                };
                if let Err(e) = sink.send(message).await {
                    error!("WebSocket send error: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let idle_timeout = self.config.idle_timeout;
        let result = loop {
            let next = match tokio::time::timeout(idle_timeout, source.next()).await {
                Ok(next) => next,
                Err(_) => break Err(AgentError::IdleTimeout(idle_timeout)),
            };
            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => break Err(AgentError::WebSocket(e)),
                None => break Ok(()),
            };

            match message {
                Message::Text(text) => self.dispatch(&text, &reply_tx),
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => self.dispatch(&text, &reply_tx),
                    Err(_) => error!("Received invalid JSON data"),
                },
                Message::Close(_) => {
                    debug!("Coordinator closed the connection");
                    break Ok(());
                }
                _ => {}
            }
        };

        writer.abort();
        result
    }

    /// Decode one dispatch and handle it in its own task
    fn dispatch(&self, frame: &str, reply_tx: &mpsc::Sender<Message>) {
        let envelope = match DispatchEnvelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(CodecError::Incomplete(e)) => {
                error!("Request is missing required fields: {}", e);
                return;
            }
            Err(e) => {
                error!("Received invalid JSON data: {}", e);
                return;
            }
        };

        debug!(
            request_id = %envelope.request_id,
            method = %envelope.payload.method,
            url = %envelope.payload.url,
            "Received proxy request"
        );

        let forwarder = self.forwarder.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            let reply = forwarder.forward(&envelope.payload).await;
            let status = reply.status_code;
            let frame = match ReplyEnvelope::new(envelope.request_id.clone(), reply).encode() {
                Ok(frame) => frame,
                Err(e) => {
                    error!(request_id = %envelope.request_id, "Failed to encode reply: {}", e);
                    return;
                }
            };

            if reply_tx.send(Message::Text(frame)).await.is_err() {
                warn!(
                    request_id = %envelope.request_id,
                    "Connection closed before reply could be sent"
                );
                return;
            }
            debug!(request_id = %envelope.request_id, status, "Sent reply");
        });
    }
}
