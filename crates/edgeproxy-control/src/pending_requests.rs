//! Pending requests tracker
//!
//! Correlates dispatched requests with the replies agents send back. Each
//! entry owns a single-use result slot; whichever of [`PendingRequests::resolve`]
//! and [`PendingRequests::cancel`] removes the entry first decides its fate,
//! and the other becomes a no-op.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use edgeproxy_proto::HttpResponsePayload;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::RelayError;

struct PendingEntry {
    reply_tx: oneshot::Sender<HttpResponsePayload>,
    created_at: Instant,
}

/// Tracks relayed requests awaiting an agent reply
#[derive(Clone, Default)]
pub struct PendingRequests {
    /// Maps request_id -> result slot
    requests: Arc<DashMap<String, PendingEntry>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending request under a fresh identifier
    ///
    /// Identifiers are random UUIDs; one that is already pending is redrawn.
    pub fn create(&self) -> PendingReply {
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut entry = Some(PendingEntry {
            reply_tx,
            created_at: Instant::now(),
        });

        let request_id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = self.requests.entry(candidate.clone()) {
                if let Some(entry) = entry.take() {
                    slot.insert(entry);
                }
                break candidate;
            }
        };

        debug!(request_id = %request_id, "Registered pending request");

        PendingReply {
            request_id,
            reply_rx,
            requests: self.clone(),
        }
    }

    /// Deliver a reply to its waiter
    ///
    /// Returns true if the waiter received it, false if the request is
    /// unknown, already resolved or timed out.
    pub fn resolve(&self, request_id: &str, reply: HttpResponsePayload) -> bool {
        let Some((_, entry)) = self.requests.remove(request_id) else {
            warn!(request_id = %request_id, "No pending request found for reply");
            return false;
        };

        let elapsed = entry.created_at.elapsed();
        if entry.reply_tx.send(reply).is_err() {
            warn!(
                request_id = %request_id,
                "Failed to deliver reply - waiter dropped"
            );
            return false;
        }

        debug!(
            request_id = %request_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "Routed reply to pending request"
        );
        true
    }

    /// Cancel a pending request (e.g., on timeout)
    ///
    /// Returns false if the request already reached a terminal state.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.requests.remove(request_id) {
            Some((_, entry)) => {
                debug!(
                    request_id = %request_id,
                    age_ms = entry.created_at.elapsed().as_millis() as u64,
                    "Cancelled pending request"
                );
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.requests.contains_key(request_id)
    }

    /// Get count of pending requests
    pub fn count(&self) -> usize {
        self.requests.len()
    }
}

/// Waiting side of one pending request
///
/// Dropping it cancels the request, so a caller that goes away never leaves
/// an entry behind.
pub struct PendingReply {
    request_id: String,
    reply_rx: oneshot::Receiver<HttpResponsePayload>,
    requests: PendingRequests,
}

impl PendingReply {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Cancel this request; false if a reply already won
    pub fn cancel(&self) -> bool {
        self.requests.cancel(&self.request_id)
    }

    /// Wait for the reply, giving up after `timeout`
    ///
    /// When the timeout fires at the same moment a reply arrives, the reply
    /// wins if it reached the table first.
    pub async fn wait(self, timeout: Duration) -> Result<HttpResponsePayload, RelayError> {
        self.wait_until(tokio::time::Instant::now() + timeout, timeout).await
    }

    /// Wait for the reply until `deadline`
    ///
    /// `timeout` is the caller's whole budget and is what a
    /// [`RelayError::Timeout`] reports.
    pub async fn wait_until(
        mut self,
        deadline: tokio::time::Instant,
        timeout: Duration,
    ) -> Result<HttpResponsePayload, RelayError> {
        match tokio::time::timeout_at(deadline, &mut self.reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // resolve always sends first; only a cancel through the table
            // by someone other than this waiter lands here.
            Ok(Err(_)) => Err(RelayError::Transport(format!(
                "pending request {} was dropped without a reply",
                self.request_id
            ))),
            Err(_) => {
                if self.cancel() {
                    debug!(request_id = %self.request_id, ?timeout, "Pending request timed out");
                    return Err(RelayError::Timeout(timeout));
                }

                // Lost the race: the resolver already removed the entry and
                // is handing the reply over.
                debug!(
                    request_id = %self.request_id,
                    "Reply arrived as the timeout fired"
                );
                (&mut self.reply_rx)
                    .await
                    .map_err(|_| RelayError::Timeout(timeout))
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.requests.requests.remove(&self.request_id);
    }
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply")
            .field("request_id", &self.request_id)
            .finish()
    }
}
