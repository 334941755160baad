use std::time::Duration;
use thiserror::Error;

/// Broker-level failure of a single relay
///
/// Upstream HTTP failures are not represented here: agents report them as
/// ordinary replies carrying a failure status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("No agents available")]
    NoAgentsAvailable,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?} waiting for agent reply")]
    Timeout(Duration),
}
