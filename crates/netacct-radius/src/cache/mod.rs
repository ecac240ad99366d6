//! Session and metadata caches
//!
//! Three independently-policied stores shared by every worker lane:
//! - switch info: TTL 5 min, refreshed from the [`SwitchInfoSource`] on a miss
//! - node sessions: no expiry, evicted when the session stops
//! - accounting sessions: TTL 5 min, latest cumulative counters per session
//!
//! A miss is a signal to create state, never an error.

pub mod ttl;

pub use ttl::TtlCache;

use crate::switches::SwitchInfoSource;
use netacct_common::{AcctSession, NodeSession, Result, SwitchInfo};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// Lifetime of switch info and accounting session entries
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Janitor sweep interval for the expiring caches
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Composite key of an accounting session entry
pub fn acct_session_key(node_id: u64, unique_session_id: u64) -> String {
    format!("{:x}:{:x}", node_id, unique_session_id)
}

fn node_session_key(node_id: u64) -> String {
    format!("{:x}", node_id)
}

/// Entry counts per cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub switch_info: usize,
    pub node_sessions: usize,
    pub acct_sessions: usize,
}

/// The caches used by accounting workers
pub struct SessionCaches {
    switch_info: Arc<TtlCache<SwitchInfo>>,
    node_sessions: TtlCache<NodeSession>,
    acct_sessions: Arc<TtlCache<AcctSession>>,
}

impl SessionCaches {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    /// Caches with a custom TTL for the expiring stores
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            switch_info: Arc::new(TtlCache::new("switch_info", ttl)),
            node_sessions: TtlCache::without_expiry("node_sessions"),
            acct_sessions: Arc::new(TtlCache::new("acct_sessions", ttl)),
        }
    }

    pub fn set_acct_session(&self, node_id: u64, unique_session_id: u64, session: AcctSession) {
        self.acct_sessions
            .set(acct_session_key(node_id, unique_session_id), session);
    }

    pub fn get_acct_session(&self, node_id: u64, unique_session_id: u64) -> Option<AcctSession> {
        self.acct_sessions
            .get(&acct_session_key(node_id, unique_session_id))
    }

    pub fn remove_acct_session(&self, node_id: u64, unique_session_id: u64) -> Option<AcctSession> {
        self.acct_sessions
            .remove(&acct_session_key(node_id, unique_session_id))
    }

    pub fn node_session(&self, node_id: u64) -> Option<NodeSession> {
        self.node_sessions.get(&node_session_key(node_id))
    }

    /// Record the node's current session, returning the one it replaces
    pub fn replace_node_session(&self, node_id: u64, session: NodeSession) -> Option<NodeSession> {
        self.node_sessions.set(node_session_key(node_id), session)
    }

    pub fn remove_node_session(&self, node_id: u64) -> Option<NodeSession> {
        self.node_sessions.remove(&node_session_key(node_id))
    }

    /// Switch metadata for `nas_ip`, fetched from `source` on a miss
    #[instrument(skip(self, source))]
    pub async fn switch_info(
        &self,
        nas_ip: IpAddr,
        source: &dyn SwitchInfoSource,
    ) -> Result<Option<SwitchInfo>> {
        let key = nas_ip.to_string();
        if let Some(info) = self.switch_info.get(&key) {
            return Ok(Some(info));
        }

        let fetched = source.fetch(nas_ip).await?;
        match &fetched {
            Some(info) => {
                debug!(switch = %info.id, "Cached switch info");
                self.switch_info.set(key, info.clone());
            }
            None => debug!("Unknown switch"),
        }
        Ok(fetched)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            switch_info: self.switch_info.len(),
            node_sessions: self.node_sessions.len(),
            acct_sessions: self.acct_sessions.len(),
        }
    }

    /// Start sweeping the expiring caches every `interval`
    pub fn spawn_janitors(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.switch_info.spawn_janitor(interval),
            self.acct_sessions.spawn_janitor(interval),
        ]
    }
}

impl Default for SessionCaches {
    fn default() -> Self {
        Self::new()
    }
}
