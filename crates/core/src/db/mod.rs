pub mod repository;
pub mod sqlite;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::Result;

pub enum DatabasePool {
    Sqlite(SqlitePool),
}

impl DatabasePool {
    /// Create a new SQLite database pool from a connect string and run
    /// migrations.
    pub async fn new_sqlite(connect_str: &str) -> Result<Self> {
        let pool = SqlitePool::connect(connect_str).await?;
        Self::run_migrations(&pool).await?;
        Ok(DatabasePool::Sqlite(pool))
    }

    /// Create a new in-memory SQLite database pool and run migrations.
    /// Useful for testing. Pinned to a single connection: each in-memory
    /// connection is its own database.
    pub async fn new_sqlite_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(":memory:")
            .await?;
        Self::run_migrations(&pool).await?;
        Ok(DatabasePool::Sqlite(pool))
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(pool)
            .await?;

        let migrations: &[&str] =
            &[include_str!("../../../../migrations/sqlite/001_initial_schema.sql")];

        for migration_sql in migrations {
            for statement in migration_sql.split(';') {
                let trimmed = statement.trim();
                if !trimmed.is_empty() && !trimmed.starts_with("PRAGMA") {
                    // Ignore errors from ALTER TABLE if column already exists
                    let result = sqlx::query(trimmed).execute(pool).await;
                    if let Err(e) = &result {
                        let msg = e.to_string();
                        if msg.contains("duplicate column") || msg.contains("already exists") {
                            continue;
                        }
                        result?;
                    }
                }
            }
        }
        Ok(())
    }
}
