use std::path::Path;

use standings_core::config::StandingsConfig;
use standings_core::db::DatabasePool;
use tracing::info;

/// Run the `init` command: create the data directory, write a default
/// config, and set up the database.
pub async fn run(data_dir: &str) -> anyhow::Result<()> {
    let data_path = Path::new(data_dir);

    if !data_path.exists() {
        std::fs::create_dir_all(data_path)?;
        info!("Created data directory: {}", data_dir);
    }

    let db_path = data_path.join("standings.db");
    let db_path_str = db_path.to_string_lossy().to_string();

    let mut config = StandingsConfig::generate_default();
    config.standings.data_dir = data_dir.to_string();
    config.standings.database.path = Some(db_path_str.clone());

    let config_path = data_path.join("standings.toml");
    let toml_str = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, &toml_str)?;
    info!("Wrote configuration to {}", config_path.display());

    let connect_str = format!("sqlite:{}?mode=rwc", db_path_str);
    DatabasePool::new_sqlite(&connect_str).await?;
    info!("Database initialized at {}", db_path_str);

    println!("Standings initialized successfully!");
    println!("  Data directory: {}", data_dir);
    println!("  Configuration: {}", config_path.display());
    println!("  Database:      {}", db_path_str);
    println!();
    println!("Next steps:");
    println!(
        "  1. Edit {} and set portal.enabled and portal.base_url",
        config_path.display()
    );
    println!("  2. Run `standings import <roster.csv>` to load the student roster");
    println!("  3. Run `standings sync` to perform the first sweep");
    println!("  4. Run `standings run` to start the daily scheduler");

    Ok(())
}
