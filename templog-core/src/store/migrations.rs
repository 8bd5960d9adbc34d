//! Database migrations.
//!
//! Only the catalog is migrated. Sensor tables are created on demand by
//! [`SensorStore::ensure_table`](super::SensorStore::ensure_table).

use crate::error::{Result, TemplogError};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 1;

/// Name of the catalog table listing every sensor table.
pub const CATALOG_TABLE: &str = "tltables";

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| TemplogError::MigrationFailed { reason: e.to_string() })?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await
            .map_err(|e| TemplogError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    Ok(())
}

#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    // Databases from earlier logger releases already have the catalog.
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (id INTEGER NOT NULL PRIMARY KEY, name TEXT)",
        CATALOG_TABLE
    );
    sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(|e| TemplogError::MigrationFailed { reason: e.to_string() })?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (1)")
        .execute(pool)
        .await
        .map_err(|e| TemplogError::MigrationFailed { reason: e.to_string() })?;

    Ok(())
}
