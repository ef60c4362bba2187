use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Hackathon, Project, User};

pub async fn fetch_user(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, username, email, skills, college, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_hackathon(pool: &PgPool, id: Uuid) -> Result<Option<Hackathon>, sqlx::Error> {
    sqlx::query_as::<_, Hackathon>(
        "SELECT id, name, location, tracks, start_at, end_at, created_at, updated_at FROM hackathons WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_project(pool: &PgPool, id: Uuid) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT id, name, description, hackathon_id, owner_id, team_members, created_at, updated_at FROM projects WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
