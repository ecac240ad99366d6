//! Windowed flow aggregation
//!
//! One task owns the group table outright, so no locking is involved. Every
//! window the table is folded into one [`NetworkEvent`] per group, the events
//! go downstream as a single batch, and the table starts over empty.

use crate::filter::NetworkFilter;
use crate::heuristics::{heuristic_for_level, FlowHeuristic};
use netacct_common::{
    BiflowRole, FlowBatch, FlowGroupKey, FlowRecord, NetAcctError, NetworkEvent, Result,
    SessionKey, DEFAULT_TIME_BUCKET_SECS, FLOW_CHANNEL_BACKLOG,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Window length, also the delay before the first flush
    pub window: Duration,
    /// Heuristics level, 0 disables
    pub heuristics: u8,
    pub filter: Option<NetworkFilter>,
    /// Downstream consumer of each window's events
    pub events_tx: Option<mpsc::Sender<Vec<NetworkEvent>>>,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_TIME_BUCKET_SECS),
            heuristics: 0,
            filter: None,
            events_tx: None,
        }
    }
}

/// Groups flow records per window and emits network events
pub struct FlowAggregator {
    window: Duration,
    heuristic: Option<Box<dyn FlowHeuristic>>,
    filter: Option<NetworkFilter>,
    events_tx: Option<mpsc::Sender<Vec<NetworkEvent>>>,
    groups: HashMap<FlowGroupKey, Vec<FlowRecord>>,
}

impl FlowAggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        Self {
            window: options.window,
            heuristic: heuristic_for_level(options.heuristics),
            filter: options.filter,
            events_tx: options.events_tx,
            groups: HashMap::new(),
        }
    }

    /// Add every record of `batch` to its group
    pub fn ingest(&mut self, batch: FlowBatch) {
        let FlowBatch { header, records } = batch;
        for mut record in records {
            record.stamp(&header);
            if let Some(filter) = &self.filter {
                if !filter.permits(&record) {
                    continue;
                }
            }
            let key = record.group_key();
            if let Some(heuristic) = &self.heuristic {
                heuristic.apply(&mut record);
            }
            self.groups.entry(key).or_default().push(record);
        }
    }

    /// Groups accumulated in the current window
    pub fn pending_groups(&self) -> usize {
        self.groups.len()
    }

    /// Close the window: one event per group, then an empty table
    #[instrument(skip(self), fields(groups = self.groups.len()))]
    pub fn tick(&mut self) -> Vec<NetworkEvent> {
        let groups = std::mem::take(&mut self.groups);
        let mut events = Vec::with_capacity(groups.len());

        for (key, records) in groups {
            match fold_group(&records) {
                Ok(event) => events.push(event),
                Err(e) => warn!(?key, error = %e, "Skipping flow group"),
            }
        }
        events
    }

    async fn flush(&mut self) {
        let events = self.tick();
        if events.is_empty() {
            return;
        }
        let Some(tx) = &self.events_tx else {
            return;
        };

        let count = events.len();
        if tx.send(events).await.is_err() {
            warn!(count, "Network event consumer gone, dropping window");
        } else {
            debug!(count, "Emitted network events");
        }
    }

    /// Drive the aggregator until `stop` fires. Unflushed groups are discarded.
    pub async fn run(
        mut self,
        mut flows_rx: mpsc::Receiver<Vec<FlowBatch>>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.window, self.window);
        info!(window = ?self.window, "Flow aggregator started");

        loop {
            tokio::select! {
                _ = &mut stop => break,
                Some(batches) = flows_rx.recv() => {
                    for batch in batches {
                        self.ingest(batch);
                    }
                }
                _ = ticker.tick() => self.flush().await,
            }
        }

        info!(discarded = self.groups.len(), "Flow aggregator stopped");
    }

    /// Start the aggregator task with a fresh inbound channel
    pub fn spawn(options: AggregatorOptions) -> AggregatorHandle {
        let (flows_tx, flows_rx) = mpsc::channel(FLOW_CHANNEL_BACKLOG);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(Self::new(options).run(flows_rx, stop_rx));
        AggregatorHandle {
            flows_tx,
            stop_tx,
            task,
        }
    }
}

/// Control surface of a running aggregator
pub struct AggregatorHandle {
    flows_tx: mpsc::Sender<Vec<FlowBatch>>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AggregatorHandle {
    /// Sender for decoded flow batches
    pub fn sender(&self) -> mpsc::Sender<Vec<FlowBatch>> {
        self.flows_tx.clone()
    }

    /// Signal stop and wait for the task to finish
    pub async fn stop(self) -> Result<()> {
        // The task may already be gone; joining reports that
        let _ = self.stop_tx.send(());
        self.task
            .await
            .map_err(|e| NetAcctError::Internal(format!("flow aggregator task failed: {e}")))
    }
}

/// Per-session observations used for counting
#[derive(Default)]
struct SessionSides {
    initiator: bool,
    responder: bool,
    packets: u64,
}

/// Distinct sessions in a group.
///
/// Unmarked records count one each. Marked records collapse by session key;
/// a key seen from both biflow sides counts its packet total.
fn session_count(records: &[FlowRecord]) -> u64 {
    let mut unmarked = 0u64;
    let mut sessions: HashMap<SessionKey, SessionSides> = HashMap::new();

    for record in records {
        let Some(key) = record.session_key() else {
            unmarked += 1;
            continue;
        };
        let sides = sessions.entry(key).or_default();
        match record.biflow {
            BiflowRole::Initiator => sides.initiator = true,
            BiflowRole::Responder => sides.responder = true,
            BiflowRole::Unidirectional => {}
        }
        sides.packets = sides.packets.saturating_add(record.packet_count);
    }

    let paired = sessions.values().map(|sides| {
        if sides.initiator && sides.responder {
            sides.packets.max(1)
        } else {
            1
        }
    });
    unmarked + paired.sum::<u64>()
}

fn fold_group(records: &[FlowRecord]) -> Result<NetworkEvent> {
    let first = records
        .first()
        .ok_or_else(|| NetAcctError::Internal("empty flow group".into()))?;
    let mut event = first.to_network_event()?;

    let earliest = records.iter().map(|r| r.start_time).filter(|&t| t != 0).min();
    let latest = records.iter().map(|r| r.end_time).filter(|&t| t != 0).max();
    if let Some(start) = earliest {
        event.start_time = start;
    }
    event.end_time = latest.unwrap_or(event.start_time);
    event.count = session_count(records);
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netacct_common::FlowHeader;
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn header() -> FlowHeader {
        FlowHeader {
            exporter: ip("192.0.2.1"),
            domain_id: 1,
            export_time: 5_000,
        }
    }

    #[test]
    fn test_fold_times() {
        let records = vec![
            FlowRecord::new(ip("10.0.0.1"), 1000, ip("10.0.0.2"), 80, 6).with_times(3_000, 0),
            FlowRecord::new(ip("10.0.0.1"), 1001, ip("10.0.0.2"), 80, 6).with_times(2_000, 4_000),
            FlowRecord::new(ip("10.0.0.1"), 1002, ip("10.0.0.2"), 80, 6).with_times(2_500, 3_500),
        ];
        let event = fold_group(&records).unwrap();
        assert_eq!(event.start_time, 2_000);
        assert_eq!(event.end_time, 4_000);
        assert_eq!(event.src_port, 1000);
        assert_eq!(event.count, 3);
    }

    #[test]
    fn test_missing_end_defaults_to_start() {
        let records =
            vec![FlowRecord::new(ip("10.0.0.1"), 1000, ip("10.0.0.2"), 80, 6).with_times(7_000, 0)];
        let event = fold_group(&records).unwrap();
        assert_eq!(event.end_time, 7_000);
    }

    #[test]
    fn test_one_sided_marked_session_counts_once() {
        let records = vec![
            FlowRecord::new(ip("10.0.0.1"), 1000, ip("10.0.0.2"), 80, 6)
                .with_biflow(BiflowRole::Initiator)
                .with_session(4)
                .with_packets(50),
            FlowRecord::new(ip("10.0.0.1"), 1000, ip("10.0.0.2"), 80, 6)
                .with_biflow(BiflowRole::Initiator)
                .with_session(4)
                .with_packets(20),
        ];
        assert_eq!(session_count(&records), 1);
    }

    #[test]
    fn test_heuristic_keeps_reply_in_its_own_group() {
        let mut aggregator = FlowAggregator::new(AggregatorOptions {
            heuristics: 1,
            ..Default::default()
        });
        let request = FlowRecord::new(ip("10.0.0.1"), 51000, ip("10.0.0.2"), 443, 6);
        let reply = FlowRecord::new(ip("10.0.0.2"), 443, ip("10.0.0.1"), 51000, 6);
        aggregator.ingest(FlowBatch::new(header(), vec![request, reply]));

        assert_eq!(aggregator.pending_groups(), 2);
        let events = aggregator.tick();
        assert_eq!(events.len(), 2);
        // The reply is grouped as received but reported towards the service port
        for event in &events {
            assert_eq!((event.src_ip, event.dst_port), (ip("10.0.0.1"), 443));
            assert_eq!(event.count, 1);
        }
    }

    #[test]
    fn test_without_heuristic_reply_is_its_own_group() {
        let mut aggregator = FlowAggregator::new(AggregatorOptions::default());
        let request = FlowRecord::new(ip("10.0.0.1"), 51000, ip("10.0.0.2"), 443, 6);
        let reply = FlowRecord::new(ip("10.0.0.2"), 443, ip("10.0.0.1"), 51000, 6);
        aggregator.ingest(FlowBatch::new(header(), vec![request, reply]));
        assert_eq!(aggregator.pending_groups(), 2);
    }

    #[test]
    fn test_stamp_applies_export_time() {
        let mut aggregator = FlowAggregator::new(AggregatorOptions::default());
        let record = FlowRecord::new(ip("10.0.0.1"), 51000, ip("10.0.0.2"), 443, 6);
        aggregator.ingest(FlowBatch::new(header(), vec![record]));

        let events = aggregator.tick();
        assert_eq!(events[0].start_time, 5_000);
        assert_eq!(events[0].end_time, 5_000);
    }
}
