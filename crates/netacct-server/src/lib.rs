//! # netacct Server
//!
//! The accounting daemon: loads configuration, waits for the database,
//! starts the worker pool and flow aggregator, and serves RADIUS accounting
//! over UDP until interrupted.
//!
//! ```text
//! UDP :1813 -> RadiusListener -> Dispatcher -> W lanes -> SqlAccountingSink
//! flow batches -> FlowAggregator --window--> event writer -> network_events
//! ```

pub mod config;
pub mod listener;
pub mod startup;

pub use config::NetAcctConfig;
pub use listener::{RadiusListener, UdpResponder};
pub use startup::{FlowPipeline, Service};
