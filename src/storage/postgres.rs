use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};

use super::{quote_table, Warehouse};
use crate::config::WarehouseConfig;
use crate::constants::{COLUMN_MAPPING, DB_ACQUIRE_TIMEOUT_SECS};
use crate::error::LoadError;
use crate::types::CanonicalRecord;

/// Postgres caps a statement at 65535 bind parameters; each row binds 16.
pub const MAX_BATCH_SIZE: usize = 65535 / COLUMN_MAPPING.len();

const CREATE_TABLE_SQL: &str = include_str!("../../migrations/001_create_flight_delays.sql");

/// Warehouse backed by a single long-lived Postgres connection.
pub struct PostgresWarehouse {
    pool: PgPool,
    batch_size: usize,
}

impl PostgresWarehouse {
    /// Build the connection handle without touching the network. The first
    /// query opens the connection, so failures surface as [`LoadError::Connection`].
    pub fn connect_lazy(config: &WarehouseConfig, batch_size: usize) -> Self {
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database);
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(DB_ACQUIRE_TIMEOUT_SECS))
            .connect_lazy_with(options);

        info!("Warehouse configured at {}", config.redacted_url());
        Self::from_pool(pool, batch_size)
    }

    pub fn from_pool(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn ensure_table(&self, table: &str) -> Result<(), LoadError> {
        let sql = create_table_sql(table)?;
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        debug!("ensured warehouse table {}", table);
        Ok(())
    }

    async fn append(&self, table: &str, records: &[CanonicalRecord]) -> Result<u64, LoadError> {
        let quoted = quoted(table)?;
        if records.is_empty() {
            return Ok(0);
        }

        let columns = COLUMN_MAPPING
            .iter()
            .map(|(_, canonical)| *canonical)
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await.map_err(classify)?;
        let mut written = 0u64;
        for chunk in records.chunks(self.batch_size) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {quoted} ({columns}) "));
            qb.push_values(chunk, |mut row, r| {
                row.push_bind(r.year)
                    .push_bind(r.month)
                    .push_bind(r.day)
                    .push_bind(r.day_of_week)
                    .push_bind(r.airline.clone())
                    .push_bind(r.flight_number.clone())
                    .push_bind(r.origin_airport.clone())
                    .push_bind(r.destination_airport.clone())
                    .push_bind(r.scheduled_departure.clone())
                    .push_bind(r.departure_time.clone())
                    .push_bind(r.departure_delay)
                    .push_bind(r.scheduled_arrival.clone())
                    .push_bind(r.arrival_time.clone())
                    .push_bind(r.arrival_delay)
                    .push_bind(r.air_time)
                    .push_bind(r.distance);
            });
            let result = qb.build().execute(&mut *tx).await.map_err(classify)?;
            written += result.rows_affected();
            debug!("inserted batch of {} rows into {}", chunk.len(), table);
        }
        tx.commit().await.map_err(classify)?;

        Ok(written)
    }

    async fn row_count(&self, table: &str) -> Result<u64, LoadError> {
        let quoted = quoted(table)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {quoted}"))
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(count.max(0) as u64)
    }
}

fn quoted(table: &str) -> Result<String, LoadError> {
    quote_table(table).ok_or_else(|| LoadError::SchemaMismatch {
        message: format!("invalid table name '{table}'"),
    })
}

/// DDL for the canonical table under `table`.
pub fn create_table_sql(table: &str) -> Result<String, LoadError> {
    Ok(CREATE_TABLE_SQL.replace("{{table}}", &quoted(table)?))
}

/// Map a driver error onto the loader's error classes, using SQLSTATE classes
/// for server-side errors.
pub fn classify(err: sqlx::Error) -> LoadError {
    let message = err.to_string();
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(code) if code.starts_with("23") => LoadError::Constraint { message },
            Some(code) if code.starts_with("42") || code.starts_with("22") => {
                LoadError::SchemaMismatch { message }
            }
            Some(code) if code.starts_with("08") || code.starts_with("28") || code == "3D000" => {
                LoadError::Connection { message }
            }
            _ => LoadError::Store { message },
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_) => LoadError::Connection { message },
        _ => LoadError::Store { message },
    }
}
