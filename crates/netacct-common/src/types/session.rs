//! Per-session state held by the accounting caches

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Latest cumulative byte counters reported for one accounting session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcctSession {
    pub in_bytes: u64,
    pub out_bytes: u64,
}

impl AcctSession {
    pub fn new(in_bytes: u64, out_bytes: u64) -> Self {
        Self { in_bytes, out_bytes }
    }
}

/// The session a node is currently attached through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSession {
    /// Unique session id of the current session
    pub unique_session_id: u64,
    /// NAS the node is attached to
    pub nas_ip: Option<IpAddr>,
    /// Session start (Unix millis)
    pub started_at: i64,
}
