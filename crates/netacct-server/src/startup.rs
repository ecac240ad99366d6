//! Service assembly and background tasks

use crate::config::NetAcctConfig;
use crate::listener::RadiusListener;
use netacct_common::{FlowBatch, NetAcctError, NetworkEvent, Result};
use netacct_flow::{AggregatorHandle, AggregatorOptions, FlowAggregator, NetworkFilter};
use netacct_radius::cache::SWEEP_INTERVAL;
use netacct_radius::{
    spawn_workers, AccountingContext, AccountingHandler, AccountingSink, Dispatcher, LogRecorder,
    NetworkEventSink, SessionCaches, SqlAccountingSink, StaticSwitchSource, Telemetry,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often queue depth gauges are published
const DEPTH_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Windows of network events awaiting the writer
const EVENT_BACKLOG: usize = 16;

/// Run `attempt` until it succeeds, sleeping `delay` between failures
pub async fn retry_forever<T, F, Fut>(what: &str, delay: Duration, mut attempt: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures = 0u32;
    loop {
        match attempt().await {
            Ok(value) => {
                if failures > 0 {
                    info!(what, failures, "Connected after retries");
                }
                return value;
            }
            Err(e) => {
                failures += 1;
                warn!(what, error = %e, retry_in = ?delay, "Connection failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Open the database pool, blocking until it answers a ping
pub async fn connect_database(config: &NetAcctConfig) -> SqlAccountingSink {
    let db = &config.database;
    retry_forever("database", Duration::from_secs(db.retry_secs), move || async move {
        let sink = SqlAccountingSink::connect(&db.url, db.max_connections).await?;
        sink.ping().await?;
        Ok::<_, NetAcctError>(sink)
    })
    .await
}

/// Keep the pool warm and report when it stops answering
pub fn spawn_ping_loop(sink: Arc<dyn AccountingSink>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            match sink.ping().await {
                Ok(()) => debug!("Database ping ok"),
                Err(e) => error!(error = %e, "Database ping failed"),
            }
        }
    })
}

/// Persist each window of network events
pub fn spawn_event_writer(
    mut events_rx: mpsc::Receiver<Vec<NetworkEvent>>,
    sink: Arc<dyn NetworkEventSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(events) = events_rx.recv().await {
            if let Err(e) = sink.write_events(&events).await {
                error!(count = events.len(), error = %e, "Failed to write network events");
            }
        }
    })
}

/// Build the flow aggregator from config, wired to `events_tx`
pub fn flow_aggregator(
    config: &NetAcctConfig,
    events_tx: mpsc::Sender<Vec<NetworkEvent>>,
) -> Result<AggregatorHandle> {
    let networks = config.flow.networks()?;
    let filter = if networks.is_empty() && !config.flow.all_networks {
        None
    } else {
        Some(NetworkFilter::new(networks).with_all_networks(config.flow.all_networks))
    };

    Ok(FlowAggregator::spawn(AggregatorOptions {
        window: config.flow.window(),
        heuristics: config.flow.heuristics,
        filter,
        events_tx: Some(events_tx),
    }))
}

/// Flow aggregation feeding the event sink
pub struct FlowPipeline {
    aggregator: AggregatorHandle,
    writer: JoinHandle<()>,
}

impl FlowPipeline {
    pub fn spawn(config: &NetAcctConfig, sink: Arc<dyn NetworkEventSink>) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BACKLOG);
        let aggregator = flow_aggregator(config, events_tx)?;
        let writer = spawn_event_writer(events_rx, sink);
        Ok(Self { aggregator, writer })
    }

    /// Where decoded flow batches are delivered
    pub fn sender(&self) -> mpsc::Sender<Vec<FlowBatch>> {
        self.aggregator.sender()
    }

    /// Stop aggregating, then let the writer finish windows already emitted
    pub async fn stop(self) -> Result<()> {
        self.aggregator.stop().await?;
        self.writer
            .await
            .map_err(|e| NetAcctError::Internal(format!("event writer task failed: {e}")))
    }
}

/// Install the log-backed metrics recorder when enabled
fn start_metrics(config: &NetAcctConfig, tasks: &mut Vec<JoinHandle<()>>) -> Option<Telemetry> {
    let metrics = &config.metrics;
    if !metrics.enabled {
        return None;
    }

    let recorder = LogRecorder::new();
    match recorder.install() {
        Ok(()) => tasks.push(recorder.spawn_reporter(metrics.report_interval())),
        Err(e) => warn!(error = %e, "Keeping the existing metrics recorder"),
    }
    Some(Telemetry::new(metrics.prefix.clone()))
}

/// The assembled daemon, ready to serve
pub struct Service {
    listener: RadiusListener,
    flows: FlowPipeline,
    tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Connect the database, then assemble every component around it
    pub async fn start(config: &NetAcctConfig) -> Result<Self> {
        let sink = Arc::new(connect_database(config).await);
        info!("Database connected");
        Self::assemble(config, sink).await
    }

    /// Spawn caches, workers, background loops and the flow pipeline, and
    /// bind the listener, all writing to `sink`
    pub async fn assemble<S>(config: &NetAcctConfig, sink: Arc<S>) -> Result<Self>
    where
        S: AccountingSink + NetworkEventSink + 'static,
    {
        let mut tasks = Vec::new();
        let telemetry = start_metrics(config, &mut tasks);

        let caches = Arc::new(SessionCaches::new());
        let mut ctx = AccountingContext::new(
            Arc::clone(&caches),
            sink.clone(),
            Arc::new(StaticSwitchSource::new(config.switches.clone())),
        )
        .with_settings(config.radius.accounting_settings(config.flow.window()));
        if let Some(telemetry) = &telemetry {
            ctx = ctx.with_telemetry(telemetry.clone());
        }

        tasks.extend(caches.spawn_janitors(SWEEP_INTERVAL));

        let lanes = config.radius.worker_count();
        let (dispatcher, receivers) = Dispatcher::new(lanes, config.radius.work_queue_size);
        tasks.extend(spawn_workers(receivers, Arc::new(AccountingHandler::new(ctx))));
        if let Some(telemetry) = telemetry {
            tasks.push(dispatcher.spawn_depth_reporter(telemetry, DEPTH_REPORT_INTERVAL));
        }
        tasks.push(spawn_ping_loop(
            sink.clone(),
            Duration::from_secs(config.database.ping_interval_secs.max(1)),
        ));

        let flows = FlowPipeline::spawn(config, sink)?;

        let listener =
            RadiusListener::bind(config.radius.listen_addr()?, dispatcher, &config.radius.secret)
                .await?
                .with_switch_secrets(&config.switches);

        Ok(Self {
            listener,
            flows,
            tasks,
        })
    }

    /// Inbound channel for the flow decoder
    pub fn flow_sender(&self) -> mpsc::Sender<Vec<FlowBatch>> {
        self.flows.sender()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve RADIUS until `shutdown` completes, then stop everything
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let served = self.listener.run(shutdown).await;

        self.flows.stop().await?;
        for task in self.tasks {
            task.abort();
        }
        served
    }
}
