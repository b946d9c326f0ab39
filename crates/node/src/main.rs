//! Node entry point.

use std::sync::Arc;

use common::SystemClock;
use event_bus::InMemoryEventBus;
use futures_util::future::join_all;
use node::bootstrap::{Bootstrap, GATED_SERVICES};
use node::config::Config;
use node::error::{NodeError, Result};
use node::readiness::ReadinessBoard;
use node::scheduler::{PayoutScheduler, run_outbox_relay};
use node::{AppState, create_app, start_services};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| NodeError::Tracing(e.to_string()))
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            error!(%error, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                error!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config)?;

    // 2. Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| NodeError::Metrics(e.to_string()))?;

    // 3. Bus and services
    let bus = InMemoryEventBus::new(config.bus_partitions);
    let services = start_services(&config, &bus, Arc::new(SystemClock)).await?;
    info!(
        partitions = config.bus_partitions,
        workers = config.consumer_workers,
        "Services started"
    );

    // 4. Background work: consumers, outbox relay, bootstrap gates
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = bus.spawn_consumers(config.consumer_workers, shutdown_rx.clone());
    tasks.push(tokio::spawn(run_outbox_relay(
        services.clone(),
        config.outbox_relay_interval,
        shutdown_rx.clone(),
    )));

    let readiness = Arc::new(ReadinessBoard::new(GATED_SERVICES));
    let bootstrap = Bootstrap::new(
        config.readiness_gate(),
        &config.readiness_probe_username,
        readiness.clone(),
    );
    let scheduler = PayoutScheduler::from_config(services.payout.clone(), &config);
    tasks.extend(bootstrap.spawn(&services, scheduler, shutdown_rx));

    // 5. HTTP
    let app = create_app(
        Arc::new(AppState {
            services,
            readiness,
        }),
        metrics_handle,
    );
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| NodeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(%addr, "Starting node");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(NodeError::Serve)?;

    // 6. Stop background work
    shutdown_tx.send_replace(true);
    for joined in join_all(tasks).await {
        if let Err(error) = joined {
            error!(%error, "Background task failed");
        }
    }
    info!("Node shut down gracefully");
    Ok(())
}
