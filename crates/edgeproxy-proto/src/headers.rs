//! Hop-by-hop header filtering
//!
//! These headers describe the agent's upstream connection, not the relayed
//! response, and must never reach the original caller.

use crate::StringMap;

/// Response headers removed before a reply is delivered (compared ignoring case)
pub const HOP_BY_HOP_HEADERS: [&str; 5] = [
    "Content-Encoding",
    "Content-Length",
    "Transfer-Encoding",
    "Connection",
    "Keep-Alive",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(name))
}

/// Remove hop-by-hop headers in place
pub fn strip_hop_by_hop(headers: &mut StringMap) {
    headers.retain(|name, _| !is_hop_by_hop(name));
}
