//! Per-connection reply reader
//!
//! Decodes reply envelopes arriving on one agent connection and hands them to
//! [`PendingRequests`]. Frames that fail to decode are logged and skipped; the
//! connection stays up. When the connection ends the reader removes it from
//! the pool. Requests already dispatched on it are left to their own timeout.
//! With an idle timeout set, a connection that stays silent that long is
//! treated as dead.

use edgeproxy_proto::{codec, CodecError, ReplyEnvelope};
use futures::{Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::{AgentConnection, PendingRequests, TransportPool, WireFrame};

/// What a reader saw over the lifetime of its connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    /// Replies handed to a waiting relay
    pub delivered: u64,
    /// Well-formed replies with no matching pending request
    pub unmatched: u64,
    /// Frames dropped because they could not be decoded
    pub malformed: u64,
}

/// Read loop for one agent connection
pub struct AgentReader {
    connection: Arc<AgentConnection>,
    pool: TransportPool,
    pending: PendingRequests,
    idle_timeout: Option<Duration>,
}

impl AgentReader {
    pub fn new(
        connection: Arc<AgentConnection>,
        pool: TransportPool,
        pending: PendingRequests,
    ) -> Self {
        Self {
            connection,
            pool,
            pending,
            idle_timeout: None,
        }
    }

    /// Give up on the connection after `timeout` without any inbound frame
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn connection(&self) -> &Arc<AgentConnection> {
        &self.connection
    }

    /// Consume inbound frames until the connection closes or fails
    pub async fn run<S, E>(self, mut frames: S) -> ReaderSummary
    where
        S: Stream<Item = Result<WireFrame, E>> + Unpin,
        E: fmt::Display,
    {
        let connection_id = self.connection.connection_id().to_string();
        let mut summary = ReaderSummary::default();

        info!(
            connection_id = %connection_id,
            agent = %self.connection.agent_label(),
            "Agent reader started"
        );

        loop {
            let next = match self.idle_timeout {
                Some(idle) => match tokio::time::timeout(idle, frames.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            connection_id = %connection_id,
                            idle_timeout = ?idle,
                            "No traffic from agent, removing connection"
                        );
                        break;
                    }
                },
                None => frames.next().await,
            };

            match next {
                Some(Ok(WireFrame::Text(text))) => {
                    self.handle_reply(codec::decode(&text), &mut summary);
                }
                Some(Ok(WireFrame::Binary(data))) => {
                    self.handle_reply(codec::decode_bytes(&data), &mut summary);
                }
                Some(Ok(WireFrame::Keepalive)) => {}
                Some(Ok(WireFrame::Close)) => {
                    info!(connection_id = %connection_id, "Agent closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    error!(
                        connection_id = %connection_id,
                        error = %e,
                        "Agent connection read error, removing connection"
                    );
                    break;
                }
                None => {
                    info!(connection_id = %connection_id, "Agent connection ended");
                    break;
                }
            }
        }

        self.connection.mark_closed();
        self.pool.unregister(&connection_id);

        debug!(
            connection_id = %connection_id,
            delivered = summary.delivered,
            unmatched = summary.unmatched,
            malformed = summary.malformed,
            "Agent reader stopped"
        );
        summary
    }

    fn handle_reply(
        &self,
        decoded: Result<ReplyEnvelope, CodecError>,
        summary: &mut ReaderSummary,
    ) {
        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    connection_id = %self.connection.connection_id(),
                    error = %e,
                    "Dropping undecodable frame from agent"
                );
                summary.malformed += 1;
                return;
            }
        };

        debug!(
            connection_id = %self.connection.connection_id(),
            request_id = %envelope.request_id,
            status = envelope.payload.status_code,
            "Received reply from agent"
        );

        if self.pending.resolve(&envelope.request_id, envelope.payload) {
            summary.delivered += 1;
        } else {
            summary.unmatched += 1;
        }
    }
}
