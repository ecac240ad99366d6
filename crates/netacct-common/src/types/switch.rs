//! SwitchInfo - metadata about a NAS sending accounting

use crate::net::MacAddr;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Switch metadata resolved from the configuration service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchInfo {
    /// Switch identifier in the configuration store
    pub id: String,
    /// Management address
    pub ip: IpAddr,
    /// Switch MAC, when known
    #[serde(default)]
    pub mac: Option<MacAddr>,
    /// Switch module/type name
    #[serde(default)]
    pub switch_type: String,
    /// Tenant owning the switch
    #[serde(default = "default_tenant")]
    pub tenant_id: u16,
    /// Per-switch RADIUS secret, overriding the listener default
    #[serde(default)]
    pub secret: Option<String>,
}

fn default_tenant() -> u16 {
    crate::DEFAULT_TENANT_ID
}
