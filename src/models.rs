use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Operation tags carried on outbox events. `UPSERT` indexes the full
/// current document; `DELETE` removes by document id. `REINDEX_*` tags are
/// treated like `UPSERT` (re-read and re-index).
pub const OP_UPSERT: &str = "UPSERT";
pub const OP_DELETE: &str = "DELETE";

/// The entity kinds this deployment indexes. Adding a kind means adding a
/// variant here, a projector and an index mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Hackathon,
    Project,
}

impl EntityKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(EntityKind::User),
            "hackathon" => Some(EntityKind::Hackathon),
            "project" => Some(EntityKind::Project),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Hackathon => "hackathon",
            EntityKind::Project => "project",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// JSON array of skill strings
    pub skills: serde_json::Value,
    pub college: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Hackathon {
    pub id: Uuid,
    pub name: String,
    pub location: String,
    /// JSON array of track strings
    pub tracks: serde_json::Value,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub hackathon_id: Uuid,
    pub owner_id: Uuid,
    /// JSON array of member identifiers
    pub team_members: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One change event in the outbox table. `processed = true` means the event
/// was claimed for delivery, not that it reached the index; delivery
/// failures after the claim are recorded in the dead-letter table keyed by
/// this event's `id`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OutboxEvent {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub op: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
}

impl OutboxEvent {
    pub fn is_delete(&self) -> bool {
        self.op == OP_DELETE
    }
}

/// One failed delivery attempt. Rows are never deleted; a successful retry
/// flips `resolved` and stamps `retried_at`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DlqEntry {
    pub id: i64,
    pub outbox_id: i64,
    pub entity_type: String,
    /// String form: deletes may no longer have a typed row to point at.
    pub entity_id: String,
    pub op: String,
    pub error_msg: String,
    #[serde(skip_serializing)]
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub retried_at: Option<DateTime<Utc>>,
    pub resolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips() {
        for kind in [EntityKind::User, EntityKind::Hackathon, EntityKind::Project] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("widget"), None);
    }

    #[test]
    fn delete_detection_is_exact() {
        let mut event = OutboxEvent {
            id: 1,
            entity_type: "user".into(),
            entity_id: Uuid::new_v4(),
            op: OP_DELETE.into(),
            payload: None,
            created_at: Utc::now(),
            processed: false,
        };
        assert!(event.is_delete());

        event.op = "delete".into();
        assert!(!event.is_delete());

        event.op = "REINDEX_OWNER".into();
        assert!(!event.is_delete());
    }
}
