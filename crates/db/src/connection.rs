use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use despacho_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Pragmas applied to every new connection: referential integrity on, WAL for
/// concurrent readers, and a busy timeout so writer contention surfaces as a
/// delay instead of an immediate SQLITE_BUSY.
async fn apply_pragmas(conn: &mut sqlx::sqlite::SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
    Ok(())
}

pub async fn connect_from_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| Box::pin(apply_pragmas(conn)))
        .connect(database_url)
        .await
}
