use std::sync::Arc;

use standings_portal::client::PortalClient;
use standings_portal::scheduler::ReconciliationScheduler;
use standings_portal::sync::SyncEngine;
use tracing::info;

/// Run the `run` command: start the daily reconciliation scheduler and keep
/// it going until CTRL+C.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    if !config.portal.enabled {
        anyhow::bail!("portal integration is disabled; enable it in the config file first");
    }

    let repo = Arc::new(super::open_repo(&config).await?);
    let portal = PortalClient::new(&config.portal);
    let engine = SyncEngine::new(repo.clone(), portal);
    let scheduler = ReconciliationScheduler::new(repo, engine, config.portal.pace_ms);

    println!(
        "Standings scheduler running for {} (portal: {})",
        config.standings.instance_name, config.portal.base_url
    );
    info!("Scheduler started; sweeps fire at local midnight");

    scheduler.run(shutdown_signal()).await?;

    info!("Scheduler shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
