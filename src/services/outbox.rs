//! Transactional outbox appends. Both helpers run inside the caller's
//! transaction: the business write and the event row commit together or
//! not at all.

use serde::Serialize;
use sqlx::{Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;

pub async fn add_outbox_event<T: Serialize>(
    tx: &mut Transaction<'_, Postgres>,
    entity_type: &str,
    entity_id: Uuid,
    op: &str,
    payload: &T,
) -> Result<(), AppError> {
    let payload = serde_json::to_value(payload)?;

    sqlx::query(
        "INSERT INTO outbox_events (entity_type, entity_id, op, payload) VALUES ($1, $2, $3, $4)",
    )
    .bind(entity_type)
    .bind(entity_id)
    .bind(op)
    .bind(payload)
    .execute(&mut **tx)
    .await?;

    debug!(entity_type, entity_id = %entity_id, op, "outbox event recorded");
    Ok(())
}

/// One event row per id, payload-less: the sync worker re-reads current
/// state from the store on apply. Used for cascading reindexes.
pub async fn add_batch_outbox_events(
    tx: &mut Transaction<'_, Postgres>,
    entity_type: &str,
    op: &str,
    ids: &[Uuid],
) -> Result<(), AppError> {
    for id in ids {
        sqlx::query("INSERT INTO outbox_events (entity_type, entity_id, op) VALUES ($1, $2, $3)")
            .bind(entity_type)
            .bind(id)
            .bind(op)
            .execute(&mut **tx)
            .await?;
    }

    if !ids.is_empty() {
        debug!(entity_type, op, count = ids.len(), "batch outbox events recorded");
    }
    Ok(())
}
