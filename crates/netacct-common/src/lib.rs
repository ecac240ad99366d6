//! # netacct Common
//!
//! Shared types and errors for the netacct accounting backend.
//!
//! ## Core Types
//!
//! - [`AccountingRequest`]: one RADIUS accounting record from a switch
//! - [`SwitchInfo`]: NAS metadata resolved from configuration
//! - [`AcctSession`]/[`NodeSession`]: per-session cache state
//! - [`FlowRecord`]/[`FlowBatch`]: decoded flow telemetry
//! - [`NetworkEvent`]: windowed aggregate of one flow group
//!
//! ## Net
//!
//! - [`net::mac`]: MAC address parsing
//! - [`net::network`]: CIDR networks

pub mod error;
pub mod net;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ConversionError, NetAcctError, ProtocolError, Result};
pub use net::{IpNetwork, MacAddr};
pub use types::{
    accounting::{AccountingRequest, AccountingResponse, AcctStatusType},
    flow::{BiflowRole, FlowBatch, FlowGroupKey, FlowHeader, FlowRecord, NetworkEvent, SessionKey},
    session::{AcctSession, NodeSession},
    switch::SwitchInfo,
};

/// netacct version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tenant used when neither the switch nor the config names one
pub const DEFAULT_TENANT_ID: u16 = 1;

/// Default per-lane accounting queue depth
pub const DEFAULT_WORK_QUEUE_SIZE: usize = 1000;

/// Default aggregation window / bandwidth time bucket in seconds
pub const DEFAULT_TIME_BUCKET_SECS: u64 = 300;

/// Inbound flow channel depth
pub const FLOW_CHANNEL_BACKLOG: usize = 1000;
