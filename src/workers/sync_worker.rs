//! The outbox drain loop: claim a batch, project each event, enqueue it on
//! the shared bulk dispatcher, account for synchronous failures. The
//! dispatcher outlives every tick; it flushes asynchronously and is closed
//! once at process shutdown.

use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};

use crate::db::dlq_repo::{self, NewDlqEntry};
use crate::db::{entity_repo, outbox_repo};
use crate::error::SyncError;
use crate::metrics;
use crate::models::{EntityKind, OutboxEvent};
use crate::search::bulk::{BulkAction, BulkDispatcher, BulkItem};
use crate::search::{self, documents};

pub const SYNC_TICK: Duration = Duration::from_secs(2);
pub const CLAIM_BATCH: i64 = 200;

pub async fn run(db: PgPool, dispatcher: BulkDispatcher, mut shutdown: watch::Receiver<bool>) {
    info!(
        tick_secs = SYNC_TICK.as_secs(),
        batch = CLAIM_BATCH,
        "sync worker started"
    );

    let mut ticker = interval_at(Instant::now() + SYNC_TICK, SYNC_TICK);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("sync worker shutting down");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = process_once(&db, &dispatcher).await {
                    error!(error = %e, "sync tick failed");
                }
            }
        }
    }
}

/// One tick: claim → project → dispatch → account. Per-event failures never
/// abort the batch; they are counted, dead-lettered and skipped.
pub async fn process_once(
    db: &PgPool,
    dispatcher: &BulkDispatcher,
) -> Result<usize, sqlx::Error> {
    let events = outbox_repo::claim(db, CLAIM_BATCH).await?;
    if events.is_empty() {
        return Ok(0);
    }

    for event in &events {
        match apply_event(db, dispatcher, event).await {
            Ok(()) => metrics::PROCESSED_EVENTS.inc(),
            Err(err) => {
                metrics::FAILED_EVENTS.inc();
                warn!(outbox_id = event.id, error = %err, "event failed, dead-lettering");

                let entry = NewDlqEntry::from_event(event, err.to_string());
                if let Err(db_err) = dlq_repo::put(db, &entry).await {
                    // the event stays processed=true, so it is lost on this
                    // path; an accepted trade-off
                    error!(outbox_id = event.id, error = %db_err, "dead-letter insert failed");
                }
            }
        }
    }

    let stats = dispatcher.stats();
    info!(
        claimed = events.len(),
        bulk_ok = stats.flushed,
        bulk_failed = stats.failed,
        "sync tick complete"
    );
    Ok(events.len())
}

/// The per-event dispatch path, shared by the sync worker, the retry worker
/// and admin-triggered retries. Success means the item was accepted by the
/// dispatcher; engine-side failures arrive later through the failure
/// channel.
pub async fn apply_event(
    db: &PgPool,
    dispatcher: &BulkDispatcher,
    event: &OutboxEvent,
) -> Result<(), SyncError> {
    let kind = EntityKind::parse(&event.entity_type)
        .ok_or_else(|| SyncError::UnknownEntityType(event.entity_type.clone()))?;

    if event.is_delete() {
        // the source row may already be gone; delete by id only
        return enqueue(dispatcher, event, kind, BulkAction::Delete, None).await;
    }

    let body = match kind {
        EntityKind::User => {
            let user = entity_repo::fetch_user(db, event.entity_id)
                .await?
                .ok_or(SyncError::EntityMissing {
                    kind: "user",
                    id: event.entity_id,
                })?;
            documents::user_doc(&user).map_err(SyncError::Projection)?
        }
        EntityKind::Hackathon => {
            let hackathon = entity_repo::fetch_hackathon(db, event.entity_id)
                .await?
                .ok_or(SyncError::EntityMissing {
                    kind: "hackathon",
                    id: event.entity_id,
                })?;
            documents::hackathon_doc(&hackathon).map_err(SyncError::Projection)?
        }
        EntityKind::Project => {
            let project = entity_repo::fetch_project(db, event.entity_id)
                .await?
                .ok_or(SyncError::EntityMissing {
                    kind: "project",
                    id: event.entity_id,
                })?;
            documents::project_doc(&project).map_err(SyncError::Projection)?
        }
    };

    enqueue(dispatcher, event, kind, BulkAction::Index, Some(body)).await
}

async fn enqueue(
    dispatcher: &BulkDispatcher,
    event: &OutboxEvent,
    kind: EntityKind,
    action: BulkAction,
    body: Option<Vec<u8>>,
) -> Result<(), SyncError> {
    dispatcher
        .add(BulkItem {
            action,
            index: search::index_for(kind),
            document_id: event.entity_id.to_string(),
            outbox_id: event.id,
            entity_type: event.entity_type.clone(),
            op: event.op.clone(),
            body,
        })
        .await?;
    Ok(())
}
