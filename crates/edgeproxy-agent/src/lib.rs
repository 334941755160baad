//! Edge Proxy Agent
//!
//! Runs inside the network the coordinator cannot reach, executes the HTTP
//! requests the coordinator dispatches to it and sends back the results.

pub mod agent;
pub mod forwarder;

pub use agent::{AgentConfig, AgentError, EdgeAgent, DEFAULT_SERVER_URL};
pub use forwarder::{ForwarderError, HttpForwarder};
