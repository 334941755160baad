//! Coordinator-side relay broker
//!
//! Pools the connected edge agents, correlates dispatched requests with the
//! replies agents send back, and exposes [`Dispatcher::relay`] as the single
//! entry point for callers.
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod pending_requests;
pub mod pool;
pub mod reader;

pub use connection::{AgentConnection, WireFrame};
pub use dispatcher::Dispatcher;
pub use error::RelayError;
pub use pending_requests::{PendingReply, PendingRequests};
pub use pool::{RandomSelection, RoundRobinSelection, SelectionStrategy, TransportPool};
pub use reader::{AgentReader, ReaderSummary};
