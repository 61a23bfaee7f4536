use standings_core::db::repository::{ReconciliationRunRepository, StudentRepository};

/// Run the `status` command: show roster, cache, and reconciliation state.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    let db_size = config
        .standings
        .database
        .path
        .as_deref()
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|| "unknown".to_string());

    let repo = super::open_repo(&config).await?;

    println!("Standings Status");
    println!("================");
    println!("Instance: {}", config.standings.instance_name);
    println!("Database: SQLite ({})", db_size);
    println!(
        "Portal:   {}",
        if config.portal.enabled {
            config.portal.base_url.as_str()
        } else {
            "disabled"
        }
    );
    println!();

    match repo.get_latest_reconciliation_run().await? {
        Some(run) => {
            println!("Last Reconciliation");
            println!("-------------------");
            println!("Status:    {:?}", run.status);
            println!(
                "Started:   {}",
                run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(completed) = run.completed_at {
                println!("Completed: {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!("Attempted: {}", run.students_attempted);
            println!("Refreshed: {}", run.refreshed);
            println!("Failures:  {} credential, {} transient", run.credential_failures, run.transient_failures);
            println!("Skipped:   {}", run.skipped);
            if let Some(ref err) = run.error_message {
                println!("Error:     {}", err);
            }
            println!();
        }
        None => {
            println!("No reconciliation runs recorded.");
            println!();
        }
    }

    let counts = repo.get_standing_counts().await?;
    println!("Counts");
    println!("------");
    println!("Students:         {}", counts.students);
    println!("Active students:  {}", counts.active_students);
    println!("Cached records:   {}", counts.cached_records);
    println!("Login errors:     {}", counts.login_errors);
    println!("Privacy opt-outs: {}", counts.privacy_opt_outs);

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_displays_correctly() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
        assert_eq!(format_bytes(1073741824), "1.0 GB");
    }
}
