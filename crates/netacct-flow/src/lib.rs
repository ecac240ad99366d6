//! # netacct Flow
//!
//! Folds decoded flow telemetry into per-window [`NetworkEvent`]s.
//!
//! ```text
//! Vec<FlowBatch> -> stamp -> filter -> heuristic -> group table --tick--> Vec<NetworkEvent>
//! ```
//!
//! [`NetworkEvent`]: netacct_common::NetworkEvent

pub mod aggregator;
pub mod filter;
pub mod heuristics;

pub use aggregator::{AggregatorHandle, AggregatorOptions, FlowAggregator};
pub use filter::NetworkFilter;
pub use heuristics::{heuristic_for_level, FlowHeuristic, PortHeuristic};
