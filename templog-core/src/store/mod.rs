//! Per-sensor time-series store with SQLite persistence.
//!
//! Every sensor gets its own table keyed by epoch seconds. A catalog table
//! (`tltables`) lists the sensor tables; it is loaded into memory when the
//! store opens so inserts never need schema introspection.
//!
//! Writes are expected to come from a single task (the ingestion
//! coordinator). Reads may run concurrently from any number of tasks; the
//! database runs in WAL mode so readers never see a partial row.

use crate::codec::{is_valid_sensor_id, Reading};
use crate::error::{Result, TemplogError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{ConnectOptions, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

pub mod migrations;

pub use migrations::CATALOG_TABLE;


/// Connection settings for [`SensorStore::open`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a statement waits on a locked database
    pub busy_timeout: Duration,

    /// Pool size shared by the writer and concurrent readers
    pub max_connections: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { busy_timeout: Duration::from_secs(5), max_connections: 4 }
    }
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same timestamp already existed and was left untouched
    Duplicate,
}

/// One row of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
}

/// Store handle. Cheap to clone; clones share the pool and the catalog.
#[derive(Clone)]
pub struct SensorStore {
    pool: SqlitePool,
    catalog: Arc<RwLock<BTreeMap<String, i64>>>,
}

impl SensorStore {
    /// Open a store backed by a private in-memory database (for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| TemplogError::DatabaseError(e.to_string()))?;

        // Every connection to :memory: is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| TemplogError::DatabaseError(e.to_string()))?;

        Self::init(pool).await
    }

    /// Open (or create) the store at `db_path`.
    ///
    /// Failure here is fatal for the ingesting process.
    #[instrument(skip(db_path, options))]
    pub async fn open(db_path: impl AsRef<Path>, options: &StoreOptions) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Opening sensor store at {:?}", db_path);

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| TemplogError::InvalidConfig {
                reason: format!("Failed to create directory {}: {}", parent.display(), e),
            })?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .log_statements(tracing::log::LevelFilter::Debug);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(connect_options)
            .await
            .map_err(|e| TemplogError::DatabaseError(e.to_string()))?;

        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        migrations::run(&pool).await?;

        let store = Self { pool, catalog: Arc::new(RwLock::new(BTreeMap::new())) };
        store.load_catalog().await?;
        Ok(store)
    }

    /// Rebuild the in-memory catalog from the persisted catalog rows.
    async fn load_catalog(&self) -> Result<()> {
        let sql = format!("SELECT id, name FROM {} ORDER BY id", CATALOG_TABLE);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TemplogError::MigrationFailed { reason: e.to_string() })?;

        let mut catalog = self.catalog.write().await;
        catalog.clear();
        for row in rows {
            let id: i64 = row.try_get("id").map_err(db_error("load_catalog"))?;
            let name: Option<String> = row.try_get("name").map_err(db_error("load_catalog"))?;
            match name {
                Some(name) if is_table_name(&name) => {
                    if let Some(existing) = case_variant(&catalog, &name) {
                        warn!(
                            id,
                            %name,
                            %existing,
                            "Ignoring catalog entry that shadows another table"
                        );
                        continue;
                    }
                    catalog.insert(name, id);
                }
                other => warn!(id, name = ?other, "Ignoring unusable catalog entry"),
            }
        }

        info!(tables = catalog.len(), "Sensor catalog loaded");
        Ok(())
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Catalog entries ordered by sequence id.
    pub async fn tables(&self) -> Vec<CatalogEntry> {
        let catalog = self.catalog.read().await;
        let mut entries: Vec<_> = catalog
            .iter()
            .map(|(name, id)| CatalogEntry { id: *id, name: name.clone() })
            .collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    /// Whether `sensor_id` has a table.
    pub async fn has_table(&self, sensor_id: &str) -> bool {
        self.catalog.read().await.contains_key(sensor_id)
    }

    /// Create the table for `sensor_id` unless the catalog already lists it.
    ///
    /// The table and its catalog row are written in one transaction and the
    /// in-memory catalog is only updated after it commits, so memory never
    /// lists a table the catalog does not. A name that differs from a known
    /// table only in case is rejected, since SQLite would resolve both to the
    /// same table.
    #[instrument(skip(self), fields(sensor = %sensor_id))]
    pub async fn ensure_table(&self, sensor_id: &str) -> Result<()> {
        if !is_table_name(sensor_id) {
            return Err(TemplogError::InvalidSensorId { sensor_id: sensor_id.to_string() });
        }

        let mut catalog = self.catalog.write().await;
        if catalog.contains_key(sensor_id) {
            return Ok(());
        }
        if let Some(existing) = case_variant(&catalog, sensor_id) {
            return Err(TemplogError::TableCreationFailed {
                sensor_id: sensor_id.to_string(),
                reason: format!("name collides with existing table {:?}", existing),
            });
        }

        let mut tx = self.pool.begin().await.map_err(creation_error(sensor_id, "begin"))?;

        // Persisted ids can include rows the in-memory catalog skipped.
        let sql = format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {}", CATALOG_TABLE);
        let seq: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut *tx)
            .await
            .map_err(creation_error(sensor_id, "next_seq"))?;

        let sql = format!(
            r#"CREATE TABLE IF NOT EXISTS "{}" (
                id INTEGER NOT NULL PRIMARY KEY,
                humidity REAL,
                tempC REAL,
                tempF REAL,
                heatIndexC REAL,
                heatIndexF REAL
            )"#,
            sensor_id
        );
        sqlx::query(&sql)
            .execute(&mut *tx)
            .await
            .map_err(creation_error(sensor_id, "create_table"))?;

        let sql = format!("INSERT INTO {} (id, name) VALUES (?, ?)", CATALOG_TABLE);
        sqlx::query(&sql)
            .bind(seq)
            .bind(sensor_id)
            .execute(&mut *tx)
            .await
            .map_err(creation_error(sensor_id, "catalog_insert"))?;

        tx.commit().await.map_err(creation_error(sensor_id, "commit"))?;
        catalog.insert(sensor_id.to_string(), seq);

        info!(seq, "Created sensor table");
        Ok(())
    }

    /// Insert `reading` into the table of `sensor_id` unless a row with the
    /// same timestamp exists. Existing rows are never overwritten.
    #[instrument(skip(self, reading), fields(sensor = %sensor_id, ts = reading.timestamp))]
    pub async fn insert(&self, sensor_id: &str, reading: &Reading) -> Result<InsertOutcome> {
        self.require_table(sensor_id).await?;

        let sql = format!(r#"SELECT id FROM "{}" WHERE id = ?"#, sensor_id);
        let existing: Option<i64> = sqlx::query_scalar(&sql)
            .bind(reading.timestamp)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("insert_lookup"))?;

        if existing.is_some() {
            debug!("Reading already stored");
            return Ok(InsertOutcome::Duplicate);
        }

        let sql = format!(
            r#"INSERT INTO "{}" (id, humidity, tempC, tempF, heatIndexC, heatIndexF)
               VALUES (?, ?, ?, ?, ?, ?)"#,
            sensor_id
        );
        sqlx::query(&sql)
            .bind(reading.timestamp)
            .bind(reading.humidity)
            .bind(reading.temp_c)
            .bind(reading.temp_f)
            .bind(reading.heat_index_c)
            .bind(reading.heat_index_f)
            .execute(&self.pool)
            .await
            .map_err(db_error("insert"))?;

        Ok(InsertOutcome::Inserted)
    }

    /// Total rows stored for `sensor_id`.
    #[instrument(skip(self), fields(sensor = %sensor_id))]
    pub async fn count(&self, sensor_id: &str) -> Result<i64> {
        self.require_table(sensor_id).await?;

        let sql = format!(r#"SELECT COUNT(id) FROM "{}""#, sensor_id);
        sqlx::query_scalar(&sql).fetch_one(&self.pool).await.map_err(db_error("count"))
    }

    /// Rows strictly between `begin` and `end`; both bounds are excluded.
    #[instrument(skip(self), fields(sensor = %sensor_id))]
    pub async fn count_in_range(
        &self,
        sensor_id: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        self.require_table(sensor_id).await?;

        let sql = format!(r#"SELECT COUNT(id) FROM "{}" WHERE id > ? AND id < ?"#, sensor_id);
        sqlx::query_scalar(&sql)
            .bind(begin.timestamp())
            .bind(end.timestamp())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("count_in_range"))
    }

    /// Readings strictly between `begin` and `end`, oldest first.
    #[instrument(skip(self), fields(sensor = %sensor_id))]
    pub async fn retrieve(
        &self,
        sensor_id: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        self.require_table(sensor_id).await?;

        let sql = format!(
            r#"SELECT id, humidity, tempC, tempF, heatIndexC, heatIndexF
               FROM "{}" WHERE id > ? AND id < ? ORDER BY id"#,
            sensor_id
        );
        let rows = sqlx::query(&sql)
            .bind(begin.timestamp())
            .bind(end.timestamp())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("retrieve"))?;

        rows.iter().map(|row| row_to_reading(sensor_id, row)).collect()
    }

    /// Close the pool. Pending reads on other clones fail afterwards.
    pub async fn close(self) {
        self.pool.close().await;
        info!("Sensor store closed");
    }

    async fn require_table(&self, sensor_id: &str) -> Result<()> {
        if self.catalog.read().await.contains_key(sensor_id) {
            Ok(())
        } else {
            Err(TemplogError::TableNotFound { sensor_id: sensor_id.to_string() })
        }
    }
}

/// Sensor id that is safe to use as a table name and does not shadow the
/// store's own tables.
fn is_table_name(name: &str) -> bool {
    is_valid_sensor_id(name)
        && !name.eq_ignore_ascii_case(CATALOG_TABLE)
        && !name.eq_ignore_ascii_case("schema_version")
}

/// Known table whose name equals `name` apart from ASCII case.
fn case_variant<'a>(catalog: &'a BTreeMap<String, i64>, name: &str) -> Option<&'a str> {
    catalog
        .keys()
        .find(|known| known.as_str() != name && known.eq_ignore_ascii_case(name))
        .map(String::as_str)
}

fn row_to_reading(sensor_id: &str, row: &SqliteRow) -> Result<Reading> {
    let get = |column: &str| -> Result<f64> {
        row.try_get::<f64, _>(column).map_err(|e| {
            TemplogError::DatabaseError(format!("Failed to read {}.{}: {}", sensor_id, column, e))
        })
    };

    Ok(Reading {
        sensor_id: sensor_id.to_string(),
        timestamp: row.try_get("id").map_err(db_error("retrieve"))?,
        humidity: get("humidity")?,
        temp_c: get("tempC")?,
        temp_f: get("tempF")?,
        heat_index_c: get("heatIndexC")?,
        heat_index_f: get("heatIndexF")?,
    })
}

fn db_error(operation: &'static str) -> impl Fn(sqlx::Error) -> TemplogError {
    move |e| {
        metrics::counter!("templog_db_errors_total", "operation" => operation).increment(1);
        TemplogError::DatabaseError(format!("{}: {}", operation, e))
    }
}

fn creation_error<'a>(
    sensor_id: &'a str,
    operation: &'static str,
) -> impl FnOnce(sqlx::Error) -> TemplogError + 'a {
    move |e| {
        metrics::counter!("templog_db_errors_total", "operation" => operation).increment(1);
        TemplogError::TableCreationFailed {
            sensor_id: sensor_id.to_string(),
            reason: format!("{}: {}", operation, e),
        }
    }
}
