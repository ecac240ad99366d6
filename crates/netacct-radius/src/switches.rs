//! Switch metadata lookups
//!
//! The distributed configuration client lives outside this crate; it plugs in
//! through [`SwitchInfoSource`].

use async_trait::async_trait;
use netacct_common::{Result, SwitchInfo};
use std::collections::HashMap;
use std::net::IpAddr;

/// Source of switch metadata, queried on a cache miss
#[async_trait]
pub trait SwitchInfoSource: Send + Sync {
    /// Metadata for the switch at `nas_ip`, `None` when unknown
    async fn fetch(&self, nas_ip: IpAddr) -> Result<Option<SwitchInfo>>;
}

/// Switches declared up front, keyed by management address
#[derive(Debug, Clone, Default)]
pub struct StaticSwitchSource {
    switches: HashMap<IpAddr, SwitchInfo>,
}

impl StaticSwitchSource {
    pub fn new(switches: Vec<SwitchInfo>) -> Self {
        Self {
            switches: switches.into_iter().map(|s| (s.ip, s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}

#[async_trait]
impl SwitchInfoSource for StaticSwitchSource {
    async fn fetch(&self, nas_ip: IpAddr) -> Result<Option<SwitchInfo>> {
        Ok(self.switches.get(&nas_ip).cloned())
    }
}
