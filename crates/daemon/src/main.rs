use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dealbot_core::{
    archive::FsArchiveStore,
    execution::RpcDealExecution,
    marketplace::{HttpMarketplace, SpidAuthProvider},
    node::{NodeClient, RpcNodeClient},
    reconcile_on_startup, validate_config, AcquisitionConfig, AcquisitionPipeline, CandidateCache,
    DirectoryWatcher, PieceLocks, ProviderAdmission, RetrievalMonitor, RetrievalMonitorConfig,
    Scheduler, WorkerPoolConfig,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Period of the status log line.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("dealbot {VERSION} starting");

    // Determine config path
    let config_path = std::env::var("DEALBOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = dealbot_core::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    // Register core metrics
    let metrics_registry = prometheus::Registry::new();
    for metric in dealbot_core::metrics::all_metrics() {
        metrics_registry
            .register(metric)
            .context("Failed to register metrics")?;
    }

    // Chain node client
    let node: Arc<dyn NodeClient> = Arc::new(
        RpcNodeClient::new(config.node.rpc_url.clone(), config.node.rpc_token.clone())
            .context("Failed to create node client")?,
    );
    let provider = node
        .provider_address()
        .await
        .context("Failed to resolve the provider actor address")?;
    info!("Acquiring deals as {provider}");

    // Marketplace coordinator client, authenticated via the node's wallet
    let auth = Arc::new(SpidAuthProvider::new(Arc::clone(&node)));
    let marketplace = Arc::new(
        HttpMarketplace::new(config.marketplace.api_url.clone(), provider.clone(), auth)
            .context("Failed to create marketplace client")?,
    );

    // Deal-execution client
    let execution = Arc::new(
        RpcDealExecution::new(config.execution.rpc_url.clone(), config.execution.rpc_token.clone())
            .context("Failed to create deal-execution client")?,
    );

    // Archive storage
    let archive = Arc::new(FsArchiveStore::new(
        config.storage.longterm_dir.clone(),
        config.storage.download_dir.clone(),
    ));
    info!(
        "Archives: longterm {:?}, downloads {:?}",
        config.storage.longterm_dir, config.storage.download_dir
    );

    // Clear retrieval state left over from a previous run
    reconcile_on_startup(Arc::clone(&node))
        .await
        .context("Startup retrieval sweep failed")?;

    // Pipeline and its shared services
    let monitor = Arc::new(RetrievalMonitor::new(
        Arc::clone(&node),
        RetrievalMonitorConfig::from_config(&config),
    ));
    let cache = Arc::new(CandidateCache::new(
        Arc::clone(&marketplace) as _,
        Duration::from_secs(config.marketplace.refresh_interval_secs),
    ));
    let pipeline = Arc::new(AcquisitionPipeline::new(
        provider,
        Arc::clone(&marketplace) as _,
        execution,
        Arc::clone(&archive) as _,
        monitor,
        Arc::clone(&cache),
        Arc::new(PieceLocks::new()),
        Arc::new(ProviderAdmission::new(
            config.marketplace.max_concurrent_retrievals_per_provider,
        )),
        AcquisitionConfig::from_config(&config),
    ));

    // Background workers
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&pipeline),
        WorkerPoolConfig::from_config(&config),
    ));
    scheduler.start();

    let watcher = DirectoryWatcher::new(pipeline, archive as _, cache, &config);
    watcher.start();

    spawn_status_loop(Arc::clone(&scheduler));

    info!("dealbot started");
    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    watcher.stop().await;
    scheduler.stop().await;
    info!("dealbot stopped");
    Ok(())
}

fn spawn_status_loop(scheduler: Arc<Scheduler>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(STATUS_INTERVAL);
        tick.tick().await;
        loop {
            tick.tick().await;
            let status = scheduler.status();
            if !status.running {
                break;
            }
            info!(
                "status: {} busy workers, {} attempts completed",
                status.busy_workers, status.attempts_completed
            );
        }
    });
}
