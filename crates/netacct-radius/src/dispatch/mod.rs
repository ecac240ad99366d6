//! Accounting dispatcher and worker pool

pub mod dispatcher;
pub mod router;
pub mod worker;

pub use dispatcher::{
    spawn_workers, AccountingJob, DispatchOutcome, Dispatcher, LaneReceiver, Responder,
};
pub use router::{default_worker_count, lane_for};
pub use worker::{AccountingHandler, HandlerMetrics};
