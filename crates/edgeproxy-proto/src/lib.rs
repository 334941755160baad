//! Edge Proxy Protocol Definitions
//!
//! This crate defines the envelopes exchanged between the coordinator and its
//! edge agents, the JSON codec used to put them on the wire, and the header
//! hygiene rules both sides apply to relayed responses.

pub mod codec;
pub mod envelope;
pub mod headers;

use std::time::Duration;

pub use codec::CodecError;
pub use envelope::*;
pub use headers::{is_hop_by_hop, strip_hop_by_hop, HOP_BY_HOP_HEADERS};

/// Path prefix agents connect to; the agent identifier follows as the last segment
pub const AGENT_WS_PATH_PREFIX: &str = "/edge/ws";

/// Default time the coordinator waits for an agent reply (60 seconds)
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(60);

/// Status code an agent synthesizes when the upstream request fails
pub const UPSTREAM_FAILURE_STATUS: u16 = 502;
