//! Bounded per-lane queues feeding the worker pool
//!
//! Every request is routed by its affinity key, so all records of one session
//! are handled in order by one lane. Dispatch never waits: a full lane drops
//! the job and bumps that lane's overflow counter.

use super::router::lane_for;
use super::worker::AccountingHandler;
use crate::telemetry::Telemetry;
use async_trait::async_trait;
use netacct_common::{AccountingRequest, AccountingResponse, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sends the protocol acknowledgement back to the NAS
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, response: AccountingResponse) -> Result<()>;
}

/// A request together with the means to answer it
pub struct AccountingJob {
    pub request: AccountingRequest,
    pub responder: Arc<dyn Responder>,
}

impl AccountingJob {
    pub fn new(request: AccountingRequest, responder: Arc<dyn Responder>) -> Self {
        Self { request, responder }
    }
}

/// Receiving end of one lane
pub type LaneReceiver = mpsc::Receiver<AccountingJob>;

/// Result of a non-blocking dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued { lane: usize },
    /// Lane full, job discarded
    Dropped { lane: usize },
    /// Lane worker gone
    Closed { lane: usize },
}

impl DispatchOutcome {
    pub fn lane(&self) -> usize {
        match *self {
            DispatchOutcome::Queued { lane }
            | DispatchOutcome::Dropped { lane }
            | DispatchOutcome::Closed { lane } => lane,
        }
    }
}

/// Fixed set of bounded lanes
#[derive(Clone)]
pub struct Dispatcher {
    lanes: Vec<mpsc::Sender<AccountingJob>>,
    overflow: Arc<Vec<AtomicU64>>,
    depth: usize,
}

impl Dispatcher {
    /// Create `lanes` queues of `depth` slots each
    pub fn new(lanes: usize, depth: usize) -> (Self, Vec<LaneReceiver>) {
        let lanes = lanes.max(1);
        let depth = depth.max(1);

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..lanes).map(|_| mpsc::channel(depth)).unzip();
        let overflow = (0..lanes).map(|_| AtomicU64::new(0)).collect();

        let dispatcher = Self {
            lanes: senders,
            overflow: Arc::new(overflow),
            depth,
        };
        (dispatcher, receivers)
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn lane_for(&self, request: &AccountingRequest) -> usize {
        lane_for(&request.affinity_key(), self.lanes.len())
    }

    /// Queue `job` on its lane without waiting
    pub fn dispatch(&self, job: AccountingJob) -> DispatchOutcome {
        let lane = self.lane_for(&job.request);
        match self.lanes[lane].try_send(job) {
            Ok(()) => DispatchOutcome::Queued { lane },
            Err(TrySendError::Full(job)) => {
                self.overflow[lane].fetch_add(1, Ordering::Relaxed);
                debug!(lane, session = %job.request.session_id, "Lane full, dropping request");
                DispatchOutcome::Dropped { lane }
            }
            Err(TrySendError::Closed(_)) => DispatchOutcome::Closed { lane },
        }
    }

    /// Jobs dropped per lane since startup
    pub fn overflow_counts(&self) -> Vec<u64> {
        self.overflow.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    /// Jobs waiting per lane
    pub fn queue_depths(&self) -> Vec<usize> {
        self.lanes
            .iter()
            .map(|tx| self.depth.saturating_sub(tx.capacity()))
            .collect()
    }

    /// Periodically publish per-lane depth and overflow gauges
    pub fn spawn_depth_reporter(&self, telemetry: Telemetry, interval: Duration) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for (lane, depth) in dispatcher.queue_depths().into_iter().enumerate() {
                    telemetry.lane_gauge("dispatch.queue_depth", lane, depth as f64);
                }
                for (lane, dropped) in dispatcher.overflow_counts().into_iter().enumerate() {
                    telemetry.lane_gauge("dispatch.overflow", lane, dropped as f64);
                }
            }
        })
    }
}

/// One task per lane, each handling its jobs strictly in order
pub fn spawn_workers(
    receivers: Vec<LaneReceiver>,
    handler: Arc<AccountingHandler>,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(lane, mut rx)| {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    handler.handle(lane, job).await;
                }
                info!(lane, "Lane closed, worker exiting");
            })
        })
        .collect()
}
