use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{EntityKind, User, OP_UPSERT};
use crate::services::outbox;

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub college: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub skills: Option<Vec<String>>,
    pub college: Option<String>,
}

/// Insert a user and its UPSERT event atomically.
pub async fn create_user(pool: &PgPool, new: NewUser) -> Result<User, AppError> {
    let mut tx = pool.begin().await?;

    let skills = serde_json::to_value(&new.skills)?;
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, skills, college)
        VALUES ($1, $2, $3, $4)
        RETURNING id, username, email, skills, college, created_at, updated_at
        "#,
    )
    .bind(&new.username)
    .bind(&new.email)
    .bind(skills)
    .bind(&new.college)
    .fetch_one(&mut *tx)
    .await?;

    outbox::add_outbox_event(&mut tx, EntityKind::User.as_str(), user.id, OP_UPSERT, &user).await?;

    tx.commit().await?;
    info!(user_id = %user.id, username = %user.username, "user created");
    Ok(user)
}

/// Apply a partial update and enqueue the cascade: one UPSERT for the user,
/// one per owned project (project documents denormalize owner data).
pub async fn update_user(pool: &PgPool, id: Uuid, updates: UserUpdate) -> Result<User, AppError> {
    let mut tx = pool.begin().await?;

    let skills = updates.skills.map(serde_json::to_value).transpose()?;
    let updated = sqlx::query(
        r#"
        UPDATE users
        SET username = COALESCE($2, username),
            email = COALESCE($3, email),
            skills = COALESCE($4, skills),
            college = COALESCE($5, college),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(updates.username)
    .bind(updates.email)
    .bind(skills)
    .bind(updates.college)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("user {id}")));
    }

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, email, skills, college, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    outbox::add_outbox_event(&mut tx, EntityKind::User.as_str(), user.id, OP_UPSERT, &user).await?;

    let project_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM projects WHERE owner_id = $1 ORDER BY id")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
    outbox::add_batch_outbox_events(&mut tx, EntityKind::Project.as_str(), OP_UPSERT, &project_ids)
        .await?;

    tx.commit().await?;
    info!(
        user_id = %user.id,
        projects = project_ids.len(),
        "user updated, reindex events queued"
    );
    Ok(user)
}
