//! netacct daemon

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use netacct_common::VERSION;
use netacct_server::{NetAcctConfig, Service};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting netacct v{}", VERSION);

    let config = NetAcctConfig::load()?;
    info!(
        listen = %config.radius.listen_addr,
        workers = config.radius.worker_count(),
        queue = config.radius.work_queue_size,
        bandwidth = config.radius.process_bandwidth_accounting,
        window_secs = config.flow.window_secs,
        "Loaded configuration"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    let service = Service::start(&config).await?;
    info!(addr = %service.local_addr()?, "Service ready");
    service.serve(shutdown).await?;

    info!("Shutting down netacct");
    Ok(())
}
