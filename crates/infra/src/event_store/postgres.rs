//! Postgres-backed event store.
//!
//! SQLx errors map onto [`EventStoreError`]:
//!
//! | SQLx error | Postgres code | EventStoreError |
//! |------------|---------------|-----------------|
//! | unique violation | `23505` | `Concurrency` (another writer took the sequence number) |
//! | check violation | `23514` | `InvalidAppend` |
//! | other database errors, pool closed, IO | - | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use miam_core::{AggregateId, ExpectedVersion};

use super::store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, batch_stream};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    position        BIGSERIAL PRIMARY KEY,
    event_id        UUID NOT NULL UNIQUE,
    aggregate_type  TEXT NOT NULL,
    aggregate_id    UUID NOT NULL,
    sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
    event_type      TEXT NOT NULL,
    event_version   INTEGER NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    payload         JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (aggregate_type, aggregate_id, sequence_number)
)
"#;

/// Append-only store over a single `events` table.
///
/// The version check and the inserts share one transaction; two writers that
/// race past the check collide on the `(aggregate_type, aggregate_id,
/// sequence_number)` unique key and the loser gets `Concurrency`.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `events` table if it is missing.
    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some((aggregate_type, aggregate_id)) = batch_stream(&events)? else {
            return Ok(vec![]);
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = current_version(&mut tx, &aggregate_type, aggregate_id).await?;
        if !expected_version.matches(current) {
            tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut next_sequence = current + 1;
        for event in events {
            let row = sqlx::query(
                r#"
                INSERT INTO events (
                    event_id,
                    aggregate_type,
                    aggregate_id,
                    sequence_number,
                    event_type,
                    event_version,
                    occurred_at,
                    payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING position
                "#,
            )
            .bind(event.event_id)
            .bind(&aggregate_type)
            .bind(aggregate_id.as_uuid())
            .bind(next_sequence as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EventStoreError::Concurrency(format!(
                        "concurrent append: sequence_number {next_sequence} already exists"
                    ))
                } else {
                    map_sqlx_error("insert_event", e)
                }
            })?;
            let position: i64 = row
                .try_get("position")
                .map_err(|e| map_sqlx_error("read_position", e))?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                aggregate_id,
                aggregate_type: aggregate_type.clone(),
                sequence_number: next_sequence,
                position: position as u64,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next_sequence += 1;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(committed)
    }

    #[instrument(skip(self), fields(aggregate_id = %aggregate_id), err)]
    async fn load_stream(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT position, event_id, aggregate_type, aggregate_id, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_type = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_type)
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT position, event_id, aggregate_type, aggregate_id, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        rows.iter().map(decode_row).collect()
    }
}

async fn current_version(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_type: &str,
    aggregate_id: AggregateId,
) -> Result<u64, EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(sequence_number), 0) AS current_version
        FROM events
        WHERE aggregate_type = $1 AND aggregate_id = $2
        "#,
    )
    .bind(aggregate_type)
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("current_version", e))?;

    let current: i64 = row
        .try_get("current_version")
        .map_err(|e| map_sqlx_error("current_version", e))?;
    Ok(current as u64)
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let read = |e: sqlx::Error| map_sqlx_error("decode_row", e);
    let position: i64 = row.try_get("position").map_err(read)?;
    let aggregate_id: uuid::Uuid = row.try_get("aggregate_id").map_err(read)?;
    let sequence_number: i64 = row.try_get("sequence_number").map_err(read)?;
    let event_version: i32 = row.try_get("event_version").map_err(read)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(read)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(read)?,
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type: row.try_get("aggregate_type").map_err(read)?,
        sequence_number: sequence_number as u64,
        position: position as u64,
        event_type: row.try_get("event_type").map_err(read)?,
        event_version: event_version as u32,
        occurred_at,
        payload: row.try_get("payload").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
