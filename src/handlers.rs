//! Admin HTTP surface: inspect the outbox and the dead-letter queue, force
//! a retry, and two illustrative producers.

use actix_web::web::{self, Data, Json};
use actix_web::Responder;
use rand::Rng;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{dlq_repo, outbox_repo};
use crate::error::AppError;
use crate::metrics;
use crate::models::{DlqEntry, OutboxEvent, User};
use crate::search::bulk::BulkDispatcher;
use crate::services::user_service::{self, NewUser, UserUpdate};
use crate::workers::{self, sync_worker};

const ADMIN_LIST_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub dispatcher: BulkDispatcher,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .service(
            web::scope("/api")
                .route("/outbox", web::get().to(list_outbox))
                .route("/dlq", web::get().to(list_dlq))
                .route("/retry/{dlq_id}", web::post().to(retry_dlq))
                .route("/add-user", web::post().to(add_user))
                .route("/update-user", web::post().to(update_user)),
        );
}

async fn health() -> impl Responder {
    "OK"
}

async fn list_outbox(state: Data<AppState>) -> Result<Json<Vec<OutboxEvent>>, AppError> {
    Ok(Json(outbox_repo::recent(&state.db, ADMIN_LIST_LIMIT).await?))
}

async fn list_dlq(state: Data<AppState>) -> Result<Json<Vec<DlqEntry>>, AppError> {
    Ok(Json(dlq_repo::recent(&state.db, ADMIN_LIST_LIMIT).await?))
}

/// Re-apply one dead-letter entry through the regular dispatch path. The
/// snapshot payload is not replayed: the projector re-reads the current
/// row, so the retry fails if the entity has been deleted since. On failure
/// the entry stays unresolved and no new dead-letter row is written.
async fn retry_dlq(
    state: Data<AppState>,
    path: web::Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let dlq_id = path.into_inner();
    let entry = dlq_repo::fetch(&state.db, dlq_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dlq entry {dlq_id}")))?;

    let event = workers::synthetic_event(&entry)?;
    sync_worker::apply_event(&state.db, &state.dispatcher, &event).await?;

    dlq_repo::mark_resolved(&state.db, dlq_id).await?;
    metrics::PROCESSED_EVENTS.inc();
    Ok(Json(json!({ "status": "retried" })))
}

/// Illustrative producer: create a user with a generated username and
/// enqueue its UPSERT event.
async fn add_user(state: Data<AppState>) -> Result<Json<User>, AppError> {
    let username = format!("user_{}", rand::thread_rng().gen_range(1..100_000));
    let user = user_service::create_user(
        &state.db,
        NewUser {
            email: format!("{username}@example.com"),
            username,
            skills: vec!["Go".into(), "React".into(), "AI".into()],
            college: "PESU".into(),
        },
    )
    .await?;
    Ok(Json(user))
}

/// Illustrative producer: update a random user and cascade reindex events
/// to the projects it owns.
async fn update_user(
    state: Data<AppState>,
    body: Option<Json<UserUpdate>>,
) -> Result<Json<User>, AppError> {
    let id: Uuid = sqlx::query_scalar("SELECT id FROM users ORDER BY random() LIMIT 1")
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("any user".to_string()))?;

    let updates = body.map(Json::into_inner).unwrap_or(UserUpdate {
        college: Some("NIT Trichy".to_string()),
        ..UserUpdate::default()
    });

    let user = user_service::update_user(&state.db, id, updates).await?;
    Ok(Json(user))
}
