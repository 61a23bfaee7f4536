pub mod import;
pub mod init;
pub mod run;
pub mod status;
pub mod sync;

use std::path::Path;

use standings_core::config::StandingsConfig;
use standings_core::db::sqlite::SqliteRepository;
use standings_core::db::DatabasePool;

/// Load and validate the configuration file.
pub(crate) fn load_config(config_path: &str) -> anyhow::Result<StandingsConfig> {
    let config = StandingsConfig::load(Path::new(config_path))?;
    config.validate()?;
    tracing::info!("Loaded configuration from {}", config_path);
    Ok(config)
}

/// Open the configured SQLite database and wrap it in a repository.
pub(crate) async fn open_repo(config: &StandingsConfig) -> anyhow::Result<SqliteRepository> {
    let path = config
        .standings
        .database
        .path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("SQLite path not configured"))?;
    let connect_str = format!("sqlite:{}?mode=rwc", path);
    let pool = match DatabasePool::new_sqlite(&connect_str).await? {
        DatabasePool::Sqlite(p) => p,
    };
    Ok(SqliteRepository::new(pool))
}
