//! Relay dispatcher
//!
//! Sends one HTTP request through a pooled agent and waits for the matching
//! reply. Exactly one of a reply, [`RelayError::NoAgentsAvailable`],
//! [`RelayError::Transport`] or [`RelayError::Timeout`] comes back per call.

use edgeproxy_proto::{DispatchEnvelope, HttpRequestPayload, HttpResponsePayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{AgentConnection, AgentReader, PendingRequests, RelayError, TransportPool};

#[derive(Clone)]
pub struct Dispatcher {
    pool: TransportPool,
    pending: PendingRequests,
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(pool: TransportPool, pending: PendingRequests) -> Self {
        Self {
            pool,
            pending,
            default_timeout: edgeproxy_proto::DEFAULT_RELAY_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &TransportPool {
        &self.pool
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Register a freshly connected agent and build the reader for its inbound half
    pub fn attach(&self, connection: Arc<AgentConnection>) -> AgentReader {
        self.pool.register(connection.clone());
        AgentReader::new(connection, self.pool.clone(), self.pending.clone())
    }

    /// Relay with the configured default timeout
    pub async fn relay_default(
        &self,
        payload: HttpRequestPayload,
    ) -> Result<HttpResponsePayload, RelayError> {
        self.relay(payload, self.default_timeout).await
    }

    /// Send `payload` through an agent and wait up to `timeout` for its reply
    ///
    /// The timeout covers queueing the dispatch as well as waiting for the
    /// reply. A reply carrying an upstream failure status is still `Ok`.
    pub async fn relay(
        &self,
        payload: HttpRequestPayload,
        timeout: Duration,
    ) -> Result<HttpResponsePayload, RelayError> {
        let deadline = Instant::now() + timeout;
        let connection = self.pool.select_one()?;

        // Register before sending so a fast reply always finds its waiter
        let pending = self.pending.create();
        let request_id = pending.request_id().to_string();

        debug!(
            request_id = %request_id,
            connection_id = %connection.connection_id(),
            method = %payload.method,
            url = %payload.url,
            "Dispatching request to agent"
        );

        let frame = DispatchEnvelope::new(request_id.clone(), payload)
            .encode()
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        match tokio::time::timeout_at(deadline, connection.send_frame(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    request_id = %request_id,
                    connection_id = %connection.connection_id(),
                    error = %e,
                    "Failed to send to agent, evicting connection"
                );
                pending.cancel();
                self.pool.unregister(connection.connection_id());
                return Err(e);
            }
            Err(_) => {
                warn!(
                    request_id = %request_id,
                    connection_id = %connection.connection_id(),
                    ?timeout,
                    "Agent send queue stayed full until the relay timed out"
                );
                pending.cancel();
                return Err(RelayError::Timeout(timeout));
            }
        }

        pending.wait_until(deadline, timeout).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("agents", &self.pool.count())
            .field("pending", &self.pending.count())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
