use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::db::dlq_repo::{self, NewDlqEntry};
use crate::error::SyncError;
use crate::models::{DlqEntry, OutboxEvent};
use crate::search::bulk::{failure_message, BulkItem, BulkListener, BulkResponseItem};
use crate::search::SearchError;

pub mod retry_worker;
pub mod sync_worker;

/// Rebuild an outbox event from its dead-letter snapshot so it can re-enter
/// the per-event dispatch path. The apply path re-reads the source row; the
/// snapshot payload is carried only for forensics.
pub fn synthetic_event(entry: &DlqEntry) -> Result<OutboxEvent, SyncError> {
    let entity_id = Uuid::parse_str(&entry.entity_id)
        .map_err(|e| SyncError::InvalidEntityId(entry.entity_id.clone(), e))?;

    let payload = if entry.payload.is_empty() {
        None
    } else {
        serde_json::from_slice(&entry.payload).ok()
    };

    Ok(OutboxEvent {
        id: entry.outbox_id,
        entity_type: entry.entity_type.clone(),
        entity_id,
        op: entry.op.clone(),
        payload,
        created_at: entry.created_at,
        processed: true,
    })
}

/// The dispatcher's asynchronous failure channel: engine-reported failures
/// become dead-letter rows. Runs on the dispatcher's background tasks with
/// its own pool connection, concurrent with later ticks.
pub struct DlqBulkListener {
    pool: PgPool,
}

impl DlqBulkListener {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BulkListener for DlqBulkListener {
    async fn on_success(&self, item: &BulkItem, _response: &BulkResponseItem) {
        debug!(index = item.index, id = %item.document_id, "synced document");
    }

    async fn on_failure(
        &self,
        item: &BulkItem,
        response: Option<&BulkResponseItem>,
        error: Option<&SearchError>,
    ) {
        let message = failure_message(response, error);
        warn!(
            index = item.index,
            id = %item.document_id,
            outbox_id = item.outbox_id,
            error = %message,
            "bulk item failed"
        );

        let entry = NewDlqEntry {
            outbox_id: item.outbox_id,
            entity_type: item.entity_type.clone(),
            entity_id: item.document_id.clone(),
            op: item.op.clone(),
            error_msg: message,
            payload: item.body.clone().unwrap_or_default(),
        };
        if let Err(db_err) = dlq_repo::put(&self.pool, &entry).await {
            error!(outbox_id = item.outbox_id, error = %db_err, "dead-letter insert failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(entity_id: &str, payload: Vec<u8>) -> DlqEntry {
        DlqEntry {
            id: 1,
            outbox_id: 42,
            entity_type: "user".into(),
            entity_id: entity_id.into(),
            op: "UPSERT".into(),
            error_msg: "boom".into(),
            payload,
            created_at: Utc::now(),
            retried_at: None,
            resolved: false,
        }
    }

    #[test]
    fn synthetic_event_restores_identity() {
        let id = Uuid::new_v4();
        let event = synthetic_event(&entry(&id.to_string(), Vec::new())).unwrap();

        assert_eq!(event.id, 42);
        assert_eq!(event.entity_id, id);
        assert_eq!(event.entity_type, "user");
        assert!(event.payload.is_none());
    }

    #[test]
    fn synthetic_event_recovers_snapshot_payload() {
        let id = Uuid::new_v4();
        let payload = br#"{"college":"PESU"}"#.to_vec();
        let event = synthetic_event(&entry(&id.to_string(), payload)).unwrap();

        assert_eq!(event.payload.unwrap()["college"], "PESU");
    }

    #[test]
    fn synthetic_event_rejects_garbage_ids() {
        let result = synthetic_event(&entry("not-a-uuid", Vec::new()));
        assert!(matches!(result, Err(SyncError::InvalidEntityId(_, _))));
    }
}
