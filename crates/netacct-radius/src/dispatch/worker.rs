//! Per-request accounting processing
//!
//! Runs inside a lane task. Nothing here may end the lane: every failure is
//! logged, counted and the next job proceeds.

use super::dispatcher::AccountingJob;
use crate::bandwidth::{time_bucket, BandwidthAccountant};
use crate::context::AccountingContext;
use crate::sink::{AccountingRecord, BandwidthRecord};
use netacct_common::{
    AccountingRequest, AccountingResponse, AcctSession, AcctStatusType, NetAcctError, NodeSession,
    SwitchInfo,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

/// Handler counters
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    pub processed: AtomicU64,
    pub sink_errors: AtomicU64,
    pub response_errors: AtomicU64,
    pub lookup_errors: AtomicU64,
}

/// Processes accounting jobs against the shared context
pub struct AccountingHandler {
    ctx: AccountingContext,
    metrics: HandlerMetrics,
}

impl AccountingHandler {
    pub fn new(ctx: AccountingContext) -> Self {
        Self {
            ctx,
            metrics: HandlerMetrics::default(),
        }
    }

    pub fn context(&self) -> &AccountingContext {
        &self.ctx
    }

    pub fn metrics(&self) -> &HandlerMetrics {
        &self.metrics
    }

    #[instrument(
        skip(self, job),
        fields(session = %job.request.session_id, status = %job.request.status)
    )]
    pub async fn handle(&self, lane: usize, job: AccountingJob) {
        let started = Instant::now();
        let AccountingJob { request, responder } = job;

        let switch = self.resolve_switch(&request).await;
        let tenant_id = switch
            .as_ref()
            .map(|s| s.tenant_id)
            .unwrap_or(self.ctx.settings.tenant_id);
        let node_id = request.node_id(tenant_id);
        let unique_session_id = request.unique_session_id();

        let bandwidth = if is_session_record(request.status) {
            self.track_node_session(node_id, unique_session_id, &request);
            let bandwidth = self.account(tenant_id, node_id, unique_session_id, &request);
            if request.status == AcctStatusType::Stop {
                self.ctx.caches.remove_acct_session(node_id, unique_session_id);
                self.ctx.caches.remove_node_session(node_id);
            }
            bandwidth
        } else {
            None
        };

        // Acknowledge before the durable write
        if let Err(e) = responder.respond(AccountingResponse::for_request(&request)).await {
            self.metrics.response_errors.fetch_add(1, Ordering::Relaxed);
            warn!(lane, error = %e, "Failed to send accounting response");
        }

        let record = AccountingRecord::from_request(&request, switch.as_ref(), tenant_id);
        self.persist(lane, record, bandwidth).await;

        self.metrics.processed.fetch_add(1, Ordering::Relaxed);
        if let Some(telemetry) = &self.ctx.telemetry {
            telemetry.timing("accounting.handle", started.elapsed());
        }
    }

    async fn resolve_switch(&self, request: &AccountingRequest) -> Option<SwitchInfo> {
        let nas_ip = request.nas_ip?;
        match self
            .ctx
            .caches
            .switch_info(nas_ip, self.ctx.switches.as_ref())
            .await
        {
            Ok(info) => info,
            Err(e) => {
                self.metrics.lookup_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    nas = %nas_ip,
                    error = %e,
                    "Switch lookup failed, continuing without metadata"
                );
                None
            }
        }
    }

    /// Keep the node pointed at its current session. A different session
    /// replacing the old one retires the old accounting entry.
    fn track_node_session(
        &self,
        node_id: u64,
        unique_session_id: u64,
        request: &AccountingRequest,
    ) {
        let caches = &self.ctx.caches;
        match caches.node_session(node_id) {
            Some(current) if current.unique_session_id == unique_session_id => {}
            previous => {
                if let Some(previous) = previous {
                    debug!(node = node_id, "Node changed session");
                    caches.remove_acct_session(node_id, previous.unique_session_id);
                }
                caches.replace_node_session(
                    node_id,
                    NodeSession {
                        unique_session_id,
                        nas_ip: request.nas_ip,
                        started_at: request.received_at,
                    },
                );
            }
        }
    }

    fn account(
        &self,
        tenant_id: u16,
        node_id: u64,
        unique_session_id: u64,
        request: &AccountingRequest,
    ) -> Option<BandwidthRecord> {
        if request.status == AcctStatusType::Start {
            self.ctx
                .caches
                .set_acct_session(node_id, unique_session_id, AcctSession::default());
            return None;
        }

        if !self.ctx.settings.process_bandwidth || !request.status.carries_usage() {
            return None;
        }

        let current = AcctSession::new(request.input_octets, request.output_octets);
        let accountant = BandwidthAccountant::new(&self.ctx.caches);
        let delta = accountant.apply(node_id, unique_session_id, current);
        if delta.is_zero() {
            return None;
        }

        let bucket = time_bucket(request.received_at, self.ctx.settings.time_bucket);
        Some(BandwidthRecord::new(tenant_id, node_id, unique_session_id, bucket, delta))
    }

    async fn persist(
        &self,
        lane: usize,
        record: AccountingRecord,
        bandwidth: Option<BandwidthRecord>,
    ) {
        let sink = &self.ctx.sink;
        let write = async {
            sink.write_accounting(&record).await?;
            if let Some(bandwidth) = &bandwidth {
                sink.write_bandwidth(bandwidth).await?;
            }
            Ok::<(), NetAcctError>(())
        };

        let failure = match tokio::time::timeout(self.ctx.settings.write_timeout, write).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(_) => NetAcctError::Timeout("accounting write".into()),
        };

        self.metrics.sink_errors.fetch_add(1, Ordering::Relaxed);
        if let Some(telemetry) = &self.ctx.telemetry {
            telemetry.increment("accounting.sink_errors");
        }
        error!(lane, session = %record.session_id, error = %failure, "Accounting write failed");
    }
}

fn is_session_record(status: AcctStatusType) -> bool {
    matches!(
        status,
        AcctStatusType::Start | AcctStatusType::InterimUpdate | AcctStatusType::Stop
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SessionCaches;
    use crate::dispatch::Responder;
    use crate::sink::AccountingSink;
    use crate::switches::StaticSwitchSource;
    use async_trait::async_trait;
    use netacct_common::{MacAddr, Result};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct MemorySink {
        accounting: Mutex<Vec<AccountingRecord>>,
        bandwidth: Mutex<Vec<BandwidthRecord>>,
    }

    #[async_trait]
    impl AccountingSink for MemorySink {
        async fn write_accounting(&self, record: &AccountingRecord) -> Result<()> {
            self.accounting.lock().push(record.clone());
            Ok(())
        }

        async fn write_bandwidth(&self, record: &BandwidthRecord) -> Result<()> {
            self.bandwidth.lock().push(record.clone());
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingResponder {
        responses: Mutex<Vec<AccountingResponse>>,
    }

    #[async_trait]
    impl Responder for RecordingResponder {
        async fn respond(&self, response: AccountingResponse) -> Result<()> {
            self.responses.lock().push(response);
            Ok(())
        }
    }

    fn handler(sink: Arc<MemorySink>, process_bandwidth: bool) -> AccountingHandler {
        let ctx = AccountingContext::new(
            Arc::new(SessionCaches::new()),
            sink,
            Arc::new(StaticSwitchSource::default()),
        )
        .with_settings(crate::context::AccountingSettings {
            process_bandwidth,
            ..Default::default()
        });
        AccountingHandler::new(ctx)
    }

    fn request(
        status: AcctStatusType,
        session: &str,
        in_bytes: u64,
        out_bytes: u64,
    ) -> AccountingRequest {
        AccountingRequest::new(status, session)
            .with_mac(MacAddr::new([0, 0x11, 0x22, 0x33, 0x44, 0x55]))
            .with_nas_ip("10.0.0.1".parse().unwrap())
            .with_octets(in_bytes, out_bytes)
    }

    async fn run(handler: &AccountingHandler, req: AccountingRequest) -> Arc<RecordingResponder> {
        let responder = Arc::new(RecordingResponder::default());
        handler
            .handle(0, AccountingJob::new(req, responder.clone()))
            .await;
        responder
    }

    #[tokio::test]
    async fn test_session_lifecycle_deltas() {
        let sink = Arc::new(MemorySink::default());
        let handler = handler(sink.clone(), true);

        run(&handler, request(AcctStatusType::Start, "s1", 0, 0)).await;
        run(&handler, request(AcctStatusType::InterimUpdate, "s1", 100, 10)).await;
        run(&handler, request(AcctStatusType::InterimUpdate, "s1", 250, 30)).await;
        let responder = run(&handler, request(AcctStatusType::Stop, "s1", 300, 30)).await;

        let deltas: Vec<(u64, u64)> = sink
            .bandwidth
            .lock()
            .iter()
            .map(|r| (r.in_bytes, r.out_bytes))
            .collect();
        assert_eq!(deltas, vec![(100, 10), (150, 20), (50, 0)]);
        assert_eq!(sink.accounting.lock().len(), 4);
        assert_eq!(responder.responses.lock().len(), 1);

        let caches = &handler.context().caches;
        let probe = request(AcctStatusType::Stop, "s1", 0, 0);
        let node_id = probe.node_id(1);
        assert_eq!(caches.get_acct_session(node_id, probe.unique_session_id()), None);
        assert_eq!(caches.node_session(node_id), None);
    }

    #[tokio::test]
    async fn test_bandwidth_disabled_writes_no_deltas() {
        let sink = Arc::new(MemorySink::default());
        let handler = handler(sink.clone(), false);

        run(&handler, request(AcctStatusType::Start, "s1", 0, 0)).await;
        run(&handler, request(AcctStatusType::InterimUpdate, "s1", 100, 10)).await;

        assert!(sink.bandwidth.lock().is_empty());
        assert_eq!(sink.accounting.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_new_session_retires_previous_entry() {
        let sink = Arc::new(MemorySink::default());
        let handler = handler(sink, true);

        let first = request(AcctStatusType::Start, "old", 0, 0);
        let node_id = first.node_id(1);
        let old_unique = first.unique_session_id();
        run(&handler, first).await;
        run(&handler, request(AcctStatusType::InterimUpdate, "old", 10, 10)).await;
        assert!(handler.context().caches.get_acct_session(node_id, old_unique).is_some());

        let second = request(AcctStatusType::Start, "new", 0, 0);
        let new_unique = second.unique_session_id();
        run(&handler, second).await;

        let caches = &handler.context().caches;
        assert_eq!(caches.get_acct_session(node_id, old_unique), None);
        assert_eq!(caches.get_acct_session(node_id, new_unique), Some(AcctSession::default()));
        assert_eq!(caches.node_session(node_id).map(|s| s.unique_session_id), Some(new_unique));
    }

    #[tokio::test]
    async fn test_macless_sessions_keep_their_own_counters() {
        let sink = Arc::new(MemorySink::default());
        let handler = handler(sink.clone(), true);
        let interim = |nas: &str, session: &str, in_bytes: u64| {
            AccountingRequest::new(AcctStatusType::InterimUpdate, session)
                .with_nas_identifier(nas)
                .with_octets(in_bytes, 0)
        };

        run(&handler, interim("sw1", "a", 1000)).await;
        run(&handler, interim("sw2", "b", 500)).await;
        run(&handler, interim("sw1", "a", 1100)).await;

        let deltas: Vec<u64> = sink.bandwidth.lock().iter().map(|r| r.in_bytes).collect();
        assert_eq!(deltas, vec![1000, 500, 100]);
        assert_eq!(handler.context().caches.stats().node_sessions, 2);
    }

    #[tokio::test]
    async fn test_accounting_on_skips_session_state() {
        let sink = Arc::new(MemorySink::default());
        let handler = handler(sink.clone(), true);

        let on = AccountingRequest::new(AcctStatusType::AccountingOn, "");
        let responder = run(&handler, on).await;

        assert_eq!(responder.responses.lock().len(), 1);
        assert_eq!(handler.context().caches.stats().node_sessions, 0);
        assert_eq!(handler.metrics().processed.load(Ordering::Relaxed), 1);
    }
}
