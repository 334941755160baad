//! Coordinator configuration

use edgeproxy_control::{RandomSelection, RoundRobinSelection, SelectionStrategy};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Agent selection policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectionKind {
    #[default]
    Random,
    RoundRobin,
}

impl SelectionKind {
    pub fn strategy(&self) -> Arc<dyn SelectionStrategy> {
        match self {
            SelectionKind::Random => Arc::new(RandomSelection),
            SelectionKind::RoundRobin => Arc::new(RoundRobinSelection::default()),
        }
    }
}

impl FromStr for SelectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(SelectionKind::Random),
            "round-robin" | "roundrobin" | "rr" => Ok(SelectionKind::RoundRobin),
            other => Err(format!(
                "Unknown selection strategy '{}' (expected 'random' or 'round-robin')",
                other
            )),
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Address serving both the ingress endpoint and agent connections
    pub listen_addr: SocketAddr,
    /// How long a relay waits for its agent reply
    pub relay_timeout: Duration,
    pub selection: SelectionKind,
    /// Interval between pings sent to each agent
    pub ping_interval: Duration,
    /// An agent silent for this long (no replies, pongs or pings) is dropped
    pub idle_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            relay_timeout: edgeproxy_proto::DEFAULT_RELAY_TIMEOUT,
            selection: SelectionKind::Random,
            ping_interval: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(40),
        }
    }
}
