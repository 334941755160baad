//! Pool of connected agents
//!
//! Every connected agent is pooled uniformly, whatever identifier it
//! presented. Which connection serves a relay is decided by a
//! [`SelectionStrategy`]; the default picks uniformly at random.

use rand::seq::SliceRandom;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::{AgentConnection, RelayError};

/// Picks the connection that will carry the next relay
pub trait SelectionStrategy: Send + Sync + fmt::Debug {
    /// Choose one of `candidates`, or `None` if there are none
    fn select(&self, candidates: &[Arc<AgentConnection>]) -> Option<Arc<AgentConnection>>;

    fn name(&self) -> &'static str;
}

/// Uniform random choice
#[derive(Debug, Default)]
pub struct RandomSelection;

impl SelectionStrategy for RandomSelection {
    fn select(&self, candidates: &[Arc<AgentConnection>]) -> Option<Arc<AgentConnection>> {
        candidates.choose(&mut rand::thread_rng()).cloned()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Cycles through the candidates in registration order
#[derive(Debug, Default)]
pub struct RoundRobinSelection {
    next: AtomicUsize,
}

impl SelectionStrategy for RoundRobinSelection {
    fn select(&self, candidates: &[Arc<AgentConnection>]) -> Option<Arc<AgentConnection>> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(index).cloned()
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Registry of live agent connections
#[derive(Debug, Clone)]
pub struct TransportPool {
    connections: Arc<RwLock<Vec<Arc<AgentConnection>>>>,
    strategy: Arc<dyn SelectionStrategy>,
}

impl TransportPool {
    /// Create an empty pool with random selection
    pub fn new() -> Self {
        Self::with_strategy(Arc::new(RandomSelection))
    }

    pub fn with_strategy(strategy: Arc<dyn SelectionStrategy>) -> Self {
        tracing::info!(strategy = strategy.name(), "Creating agent transport pool");
        Self {
            connections: Arc::new(RwLock::new(Vec::new())),
            strategy,
        }
    }

    /// Add a connection to the pool
    ///
    /// Registering the same connection twice keeps a single entry.
    pub fn register(&self, connection: Arc<AgentConnection>) {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if connections
            .iter()
            .any(|c| c.connection_id() == connection.connection_id())
        {
            tracing::debug!(
                connection_id = %connection.connection_id(),
                "Connection already registered"
            );
            return;
        }

        tracing::info!(
            connection_id = %connection.connection_id(),
            agent = %connection.agent_label(),
            pool_size = connections.len() + 1,
            "Registered agent connection"
        );
        connections.push(connection);
    }

    /// Remove a connection from the pool
    ///
    /// Returns `false` (and does nothing else) if it was not registered.
    pub fn unregister(&self, connection_id: &str) -> bool {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let before = connections.len();
        connections.retain(|c| c.connection_id() != connection_id);
        let removed = connections.len() != before;

        if removed {
            tracing::info!(
                connection_id = %connection_id,
                pool_size = connections.len(),
                "Unregistered agent connection"
            );
        } else {
            tracing::debug!(connection_id = %connection_id, "Connection not in pool");
        }

        removed
    }

    /// Pick a connection for the next relay
    ///
    /// Never waits: an empty pool fails straight away.
    pub fn select_one(&self) -> Result<Arc<AgentConnection>, RelayError> {
        let connections = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        self.strategy
            .select(&connections)
            .ok_or(RelayError::NoAgentsAvailable)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|c| c.connection_id() == connection_id)
    }

    /// Snapshot of the current members
    pub fn list(&self) -> Vec<Arc<AgentConnection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}

impl Default for TransportPool {
    fn default() -> Self {
        Self::new()
    }
}
