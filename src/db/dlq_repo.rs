use sqlx::PgPool;
use tracing::{debug, warn};

use crate::metrics;
use crate::models::{DlqEntry, OutboxEvent};

/// A dead-letter row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewDlqEntry {
    pub outbox_id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub op: String,
    pub error_msg: String,
    pub payload: Vec<u8>,
}

impl NewDlqEntry {
    /// Snapshot a failed outbox event. The inline payload (when present) is
    /// kept as bytes so the row stays useful even after the source row is
    /// gone.
    pub fn from_event(event: &OutboxEvent, error_msg: String) -> Self {
        let payload = event
            .payload
            .as_ref()
            .map(|v| serde_json::to_vec(v).unwrap_or_default())
            .unwrap_or_default();

        Self {
            outbox_id: event.id,
            entity_type: event.entity_type.clone(),
            entity_id: event.entity_id.to_string(),
            op: event.op.clone(),
            error_msg,
            payload,
        }
    }
}

/// Append one dead-letter row. Concurrent appends are fine (plain INSERT).
pub async fn put(pool: &PgPool, entry: &NewDlqEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO dead_letter_events (outbox_id, entity_type, entity_id, op, error_msg, payload)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.outbox_id)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.op)
    .bind(&entry.error_msg)
    .bind(&entry.payload)
    .execute(pool)
    .await?;

    metrics::DLQ_EVENTS.inc();
    debug!(outbox_id = entry.outbox_id, "dead-letter row recorded");
    Ok(())
}

/// Oldest-first scan of unresolved entries for the retry loop.
pub async fn list_unresolved(pool: &PgPool, limit: i64) -> Result<Vec<DlqEntry>, sqlx::Error> {
    sqlx::query_as::<_, DlqEntry>(
        r#"
        SELECT id, outbox_id, entity_type, entity_id, op, error_msg, payload,
               created_at, retried_at, resolved
        FROM dead_letter_events
        WHERE resolved = false
        ORDER BY id ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn fetch(pool: &PgPool, id: i64) -> Result<Option<DlqEntry>, sqlx::Error> {
    sqlx::query_as::<_, DlqEntry>(
        r#"
        SELECT id, outbox_id, entity_type, entity_id, op, error_msg, payload,
               created_at, retried_at, resolved
        FROM dead_letter_events
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Flip an entry to resolved and stamp the retry time. The row itself is
/// kept as an audit trail.
pub async fn mark_resolved(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE dead_letter_events
        SET resolved = true, retried_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!(dlq_id = id, "dead-letter entry vanished before resolve");
    }
    Ok(())
}

/// Newest-first listing for the admin surface.
pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<DlqEntry>, sqlx::Error> {
    sqlx::query_as::<_, DlqEntry>(
        r#"
        SELECT id, outbox_id, entity_type, entity_id, op, error_msg, payload,
               created_at, retried_at, resolved
        FROM dead_letter_events
        ORDER BY id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
