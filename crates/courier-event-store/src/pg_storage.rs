//! `PostgreSQL` implementation of the `Storage` trait.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

use courier_core::clock::{Clock, SystemClock};
use courier_core::context::Context;
use courier_core::error::StorageError;
use courier_core::storage::{Filter, PersistedRecord, Storage};

use crate::schema::CREATE_EVENTS_TABLE;

const SELECT_LATEST_IN_STREAM: &str = "
    SELECT aggregate_id, version, kind, payload, correlation_id, recorded_at
    FROM courier_events
    WHERE aggregate_id = $1
    ORDER BY version DESC
    LIMIT 1";

const SELECT_LATEST: &str = "
    SELECT aggregate_id, version, kind, payload, correlation_id, recorded_at
    FROM courier_events
    ORDER BY recorded_at DESC, version DESC
    LIMIT 1";

const SELECT_STREAM: &str = "
    SELECT aggregate_id, version, kind, payload, correlation_id, recorded_at
    FROM courier_events
    WHERE aggregate_id = $1
    ORDER BY version ASC";

const SELECT_ALL: &str = "
    SELECT aggregate_id, version, kind, payload, correlation_id, recorded_at
    FROM courier_events
    ORDER BY recorded_at ASC, aggregate_id ASC, version ASC";

const INSERT_RECORD: &str = "
    INSERT INTO courier_events
        (aggregate_id, version, kind, payload, correlation_id, recorded_at)
    VALUES ($1, $2, $3, $4, $5, $6)";

/// PostgreSQL-backed storage.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgStorage {
    /// Creates a new `PgStorage` over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for deadline checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Connects a new pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Backend` if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(backend)?;
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn guard(&self, ctx: &Context) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::NotOpen);
        }
        if ctx.is_expired(self.clock.as_ref()) {
            return Err(StorageError::Cancelled);
        }
        Ok(())
    }
}

impl fmt::Debug for PgStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStorage")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for PgStorage {
    #[instrument(skip_all)]
    async fn open(&self, ctx: &Context) -> Result<(), StorageError> {
        self.guard(ctx)?;
        sqlx::raw_sql(CREATE_EVENTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        info!("event table ready");
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &Context, filter: &Filter) -> Result<PersistedRecord, StorageError> {
        self.guard(ctx)?;
        let row = match &filter.aggregate_id {
            Some(aggregate_id) => {
                sqlx::query(SELECT_LATEST_IN_STREAM)
                    .bind(aggregate_id)
                    .fetch_optional(&self.pool)
                    .await
            }
            None => sqlx::query(SELECT_LATEST).fetch_optional(&self.pool).await,
        }
        .map_err(backend)?;

        row.as_ref()
            .map(to_record)
            .transpose()
            .map_err(backend)?
            .ok_or(StorageError::NotFound)
    }

    #[instrument(skip(self, ctx))]
    async fn load(
        &self,
        ctx: &Context,
        filter: &Filter,
    ) -> Result<Vec<PersistedRecord>, StorageError> {
        self.guard(ctx)?;
        let rows = match &filter.aggregate_id {
            Some(aggregate_id) => {
                sqlx::query(SELECT_STREAM)
                    .bind(aggregate_id)
                    .fetch_all(&self.pool)
                    .await
            }
            None => sqlx::query(SELECT_ALL).fetch_all(&self.pool).await,
        }
        .map_err(backend)?;

        let records = rows
            .iter()
            .map(to_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        debug!(count = records.len(), "loaded records");
        Ok(records)
    }

    #[instrument(skip_all, fields(count = records.len()))]
    async fn put(&self, ctx: &Context, records: &[PersistedRecord]) -> Result<(), StorageError> {
        self.guard(ctx)?;
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;
        for record in records {
            sqlx::query(INSERT_RECORD)
                .bind(&record.aggregate_id)
                .bind(record.version)
                .bind(&record.kind)
                .bind(&record.payload)
                .bind(record.correlation_id)
                .bind(record.recorded_at)
                .execute(&mut *tx)
                .await
                .map_err(|err| insert_error(err, record))?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}

fn to_record(row: &PgRow) -> Result<PersistedRecord, sqlx::Error> {
    Ok(PersistedRecord {
        aggregate_id: row.try_get("aggregate_id")?,
        version: row.try_get("version")?,
        kind: row.try_get("kind")?,
        payload: row.try_get("payload")?,
        correlation_id: row.try_get("correlation_id")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

// The transaction rolls back on drop, so a conflict leaves the batch unwritten.
fn insert_error(err: sqlx::Error, record: &PersistedRecord) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StorageError::ConcurrencyConflict {
                aggregate_id: record.aggregate_id.clone(),
                version: record.version,
            };
        }
    }
    backend(err)
}

#[allow(clippy::needless_pass_by_value)]
fn backend(err: sqlx::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}
