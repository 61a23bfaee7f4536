use std::sync::Arc;
use std::time::Instant;

use standings_portal::client::PortalClient;
use standings_portal::scheduler::ReconciliationScheduler;
use standings_portal::sync::SyncEngine;
use tracing::{error, warn};

/// Run the `sync` command: one immediate reconciliation sweep.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    if !config.portal.enabled {
        warn!("portal integration is not enabled in the configuration");
        println!("Portal integration is disabled. Enable it in your config file first.");
        return Ok(());
    }

    let repo = Arc::new(super::open_repo(&config).await?);
    let portal = PortalClient::new(&config.portal);
    let engine = SyncEngine::new(repo.clone(), portal);
    let scheduler = ReconciliationScheduler::new(repo, engine, config.portal.pace_ms);

    println!("Starting reconciliation sweep...");
    let start = Instant::now();

    match scheduler.run_once().await {
        Ok(summary) => {
            println!(
                "Sweep completed in {:.1}s",
                start.elapsed().as_secs_f64()
            );
            println!("  Attempted:           {}", summary.students_attempted);
            println!("  Refreshed:           {}", summary.refreshed);
            println!("  Credential failures: {}", summary.credential_failures);
            println!("  Transient failures:  {}", summary.transient_failures);
            println!("  Skipped:             {}", summary.skipped);
        }
        Err(e) => {
            error!("Sweep failed: {e}");
            println!("Sweep failed: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}
