//! # netacct RADIUS
//!
//! RADIUS accounting ingestion: wire codec, affinity dispatch onto a fixed
//! worker pool, session caches and bandwidth delta accounting.
//!
//! ## Flow
//!
//! ```text
//! datagram -> protocol -> Dispatcher -> lane[i] -> AccountingHandler -> AccountingSink
//!                                                        |
//!                                                   SessionCaches
//! ```
//!
//! All records of one session share an affinity key and so a lane. The
//! caches are read and written without locks on that basis.

pub mod bandwidth;
pub mod cache;
pub mod context;
pub mod dispatch;
pub mod protocol;
pub mod sink;
pub mod switches;
pub mod telemetry;

pub use bandwidth::{BandwidthAccountant, BandwidthDelta};
pub use cache::{SessionCaches, TtlCache};
pub use context::{AccountingContext, AccountingSettings};
pub use dispatch::{
    spawn_workers, AccountingHandler, AccountingJob, DispatchOutcome, Dispatcher, Responder,
};
pub use sink::{
    AccountingRecord, AccountingSink, BandwidthRecord, NetworkEventSink, SqlAccountingSink,
};
pub use switches::{StaticSwitchSource, SwitchInfoSource};
pub use telemetry::{LogRecorder, MetricSample, MetricValue, Telemetry};
