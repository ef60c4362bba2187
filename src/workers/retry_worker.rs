//! Periodic sweep over unresolved dead-letter entries. Each entry is
//! rebuilt into a synthetic outbox event and pushed through the same
//! per-event dispatch path as the sync worker. Successful retries are
//! marked resolved; failures leave the row untouched for the next sweep.

use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::db::dlq_repo;
use crate::metrics;
use crate::search::bulk::BulkDispatcher;
use crate::workers::{sync_worker, synthetic_event};

pub const RETRY_TICK: Duration = Duration::from_secs(30);
pub const RETRY_BATCH: i64 = 50;

pub async fn run(db: PgPool, dispatcher: BulkDispatcher, mut shutdown: watch::Receiver<bool>) {
    info!(
        tick_secs = RETRY_TICK.as_secs(),
        batch = RETRY_BATCH,
        "retry worker started"
    );

    let mut ticker = interval_at(Instant::now() + RETRY_TICK, RETRY_TICK);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("retry worker shutting down");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = retry_once(&db, &dispatcher).await {
                    error!(error = %e, "retry sweep failed");
                }
            }
        }
    }
}

pub async fn retry_once(db: &PgPool, dispatcher: &BulkDispatcher) -> Result<usize, sqlx::Error> {
    let entries = dlq_repo::list_unresolved(db, RETRY_BATCH).await?;
    let mut resolved = 0;

    for entry in &entries {
        debug!(
            dlq_id = entry.id,
            entity = %entry.entity_type,
            op = %entry.op,
            "retrying dead-letter entry"
        );

        let event = match synthetic_event(entry) {
            Ok(event) => event,
            Err(err) => {
                warn!(dlq_id = entry.id, error = %err, "cannot rebuild event, skipping");
                continue;
            }
        };

        match sync_worker::apply_event(db, dispatcher, &event).await {
            Ok(()) => {
                if let Err(db_err) = dlq_repo::mark_resolved(db, entry.id).await {
                    error!(dlq_id = entry.id, error = %db_err, "failed to mark entry resolved");
                    continue;
                }
                metrics::PROCESSED_EVENTS.inc();
                resolved += 1;
                info!(dlq_id = entry.id, "dead-letter entry resolved");
            }
            Err(err) => {
                warn!(dlq_id = entry.id, error = %err, "retry failed, entry left unresolved");
            }
        }
    }

    Ok(resolved)
}
