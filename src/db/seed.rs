use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Insert one user, hackathon and project so a fresh deployment has
/// something to sync. Skipped when any user already exists.
pub async fn seed(pool: &PgPool) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .context("failed to count users")?;

    if count > 0 {
        info!("data already exists, skipping seed");
        return Ok(());
    }

    let mut tx = pool.begin().await.context("failed to open seed transaction")?;

    let user_id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (username, email, skills, college) VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind("prathamesh")
    .bind("me@example.com")
    .bind(serde_json::json!(["Go", "React", "AI"]))
    .bind("PESU")
    .fetch_one(&mut *tx)
    .await
    .context("failed to seed user")?;

    let now = Utc::now();
    let hackathon_id: Uuid = sqlx::query_scalar(
        "INSERT INTO hackathons (name, location, tracks, start_at, end_at) VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind("DevFest")
    .bind("Bengaluru")
    .bind(serde_json::json!(["AI", "Web"]))
    .bind(now)
    .bind(now + Duration::hours(48))
    .fetch_one(&mut *tx)
    .await
    .context("failed to seed hackathon")?;

    sqlx::query(
        "INSERT INTO projects (name, description, hackathon_id, owner_id, team_members) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind("Voice for All")
    .bind("AI assistant for mute people")
    .bind(hackathon_id)
    .bind(user_id)
    .bind(serde_json::json!([]))
    .execute(&mut *tx)
    .await
    .context("failed to seed project")?;

    tx.commit().await.context("failed to commit seed transaction")?;
    info!("sample data inserted");
    Ok(())
}
