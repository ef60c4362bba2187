use sqlx::PgPool;
use tracing::debug;

use crate::models::OutboxEvent;

/// Atomically claim up to `limit` unprocessed events.
///
/// Lock, flag flip and read happen in one statement, so a crash mid-claim
/// releases the row locks without marking anything processed, and
/// `SKIP LOCKED` keeps concurrently claiming workers disjoint. An empty
/// result (including `limit = 0`) is a non-error and commits no write.
pub async fn claim(pool: &PgPool, limit: i64) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    let mut events = sqlx::query_as::<_, OutboxEvent>(
        r#"
        WITH picked AS (
            SELECT id FROM outbox_events
            WHERE processed = false
            ORDER BY id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE outbox_events o
        SET processed = true
        FROM picked
        WHERE o.id = picked.id
        RETURNING o.id, o.entity_type, o.entity_id, o.op, o.payload, o.created_at, o.processed
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    // UPDATE .. RETURNING carries no ordering guarantee
    events.sort_by_key(|e| e.id);

    if !events.is_empty() {
        debug!(count = events.len(), "claimed outbox events");
    }

    Ok(events)
}

/// Newest-first listing for the admin surface.
pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    sqlx::query_as::<_, OutboxEvent>(
        r#"
        SELECT id, entity_type, entity_id, op, payload, created_at, processed
        FROM outbox_events
        ORDER BY id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
