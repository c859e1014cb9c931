use anyhow::Result;
use qa_control::TtlReaper;
use qa_metrics::{init_tracing, MetricsService};
use qa_provisioner::{build_control_plane, load_config};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => warn!("Unable to listen for shutdown signal: {}", err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    let config = load_config()?;
    init_tracing(&config.logging)?;

    match dotenv {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    info!("Starting QA provisioner");
    info!(
        base_workdir = %config.data.base_workdir,
        network = %config.docker.network,
        default_ttl_minutes = config.environments.default_ttl_minutes,
        "Configuration loaded"
    );

    let metrics = Arc::new(MetricsService::new()?);
    let control_plane = build_control_plane(config.clone()).await?;
    metrics.set_active_environments(control_plane.store().len().await);

    let reaper_handle = if config.environments.gc_interval_secs > 0 {
        let reaper = {
            let metrics = metrics.clone();
            let store = control_plane.store();
            TtlReaper::new(
                control_plane.clone(),
                Duration::from_secs(config.environments.gc_interval_secs),
            )
            .with_observer(move |collected| {
                metrics.record_garbage_collected(collected.len());
                if let Some(active) = store.try_len() {
                    metrics.set_active_environments(active);
                }
            })
        };
        Some(tokio::spawn(async move { reaper.start().await }))
    } else {
        info!("Background garbage collection disabled");
        None
    };

    let result = qa_api::start_server(
        config.server.bind.clone(),
        config.server.port,
        control_plane,
        metrics,
        shutdown_signal(),
    )
    .await;

    if let Some(handle) = reaper_handle {
        handle.abort();
    }

    if let Err(e) = result {
        warn!("API server error: {}", e);
        return Err(anyhow::anyhow!(e));
    }

    info!("QA provisioner shutdown complete");
    Ok(())
}
