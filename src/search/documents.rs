//! Projectors: pure `row -> document bytes` functions, one per entity
//! kind. JSON-array columns are decoded to native sequences before
//! re-encoding; a decode failure is a permanent projection error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Hackathon, Project, User};

#[derive(Debug, Serialize)]
struct UserDoc<'a> {
    username: &'a str,
    email: &'a str,
    skills: Vec<String>,
    college: &'a str,
    updated_at: DateTime<Utc>,
}

pub fn user_doc(user: &User) -> Result<Vec<u8>, serde_json::Error> {
    let skills: Vec<String> = serde_json::from_value(user.skills.clone())?;
    serde_json::to_vec(&UserDoc {
        username: &user.username,
        email: &user.email,
        skills,
        college: &user.college,
        updated_at: user.updated_at,
    })
}

#[derive(Debug, Serialize)]
struct HackathonDoc<'a> {
    name: &'a str,
    location: &'a str,
    tracks: Vec<String>,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub fn hackathon_doc(hackathon: &Hackathon) -> Result<Vec<u8>, serde_json::Error> {
    let tracks: Vec<String> = serde_json::from_value(hackathon.tracks.clone())?;
    serde_json::to_vec(&HackathonDoc {
        name: &hackathon.name,
        location: &hackathon.location,
        tracks,
        start_at: hackathon.start_at,
        end_at: hackathon.end_at,
        updated_at: hackathon.updated_at,
    })
}

#[derive(Debug, Serialize)]
struct ProjectDoc<'a> {
    name: &'a str,
    description: &'a str,
    hackathon_id: Uuid,
    owner_id: Uuid,
    team_members: Vec<String>,
    updated_at: DateTime<Utc>,
}

pub fn project_doc(project: &Project) -> Result<Vec<u8>, serde_json::Error> {
    let team_members: Vec<String> = serde_json::from_value(project.team_members.clone())?;
    serde_json::to_vec(&ProjectDoc {
        name: &project.name,
        description: &project.description,
        hackathon_id: project.hackathon_id,
        owner_id: project.owner_id,
        team_members,
        updated_at: project.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "prathamesh".into(),
            email: "me@example.com".into(),
            skills: json!(["Go", "React", "AI"]),
            college: "PESU".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn user_doc_decodes_skills_and_keeps_timestamp() {
        let user = sample_user();
        let bytes = user_doc(&user).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["username"], "prathamesh");
        assert_eq!(doc["skills"], json!(["Go", "React", "AI"]));
        assert_eq!(doc["college"], "PESU");
        let stamped: DateTime<Utc> = serde_json::from_value(doc["updated_at"].clone()).unwrap();
        assert_eq!(stamped, user.updated_at);
        // id never appears in the body; it is the document id in the index
        assert!(doc.get("id").is_none());
    }

    #[test]
    fn corrupt_skills_column_is_a_projection_error() {
        let mut user = sample_user();
        user.skills = json!("not-an-array");
        assert!(user_doc(&user).is_err());

        user.skills = json!([1, 2, 3]);
        assert!(user_doc(&user).is_err());
    }

    #[test]
    fn project_doc_carries_denormalized_owner() {
        let project = Project {
            id: Uuid::new_v4(),
            name: "Voice for All".into(),
            description: "AI assistant for mute people".into(),
            hackathon_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            team_members: json!([]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let bytes = project_doc(&project).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["owner_id"], json!(project.owner_id.to_string()));
        assert_eq!(doc["hackathon_id"], json!(project.hackathon_id.to_string()));
        assert_eq!(doc["team_members"], json!([]));
    }

    #[test]
    fn hackathon_doc_has_both_date_bounds() {
        let hackathon = Hackathon {
            id: Uuid::new_v4(),
            name: "DevFest".into(),
            location: "Bengaluru".into(),
            tracks: json!(["AI", "Web"]),
            start_at: Utc::now(),
            end_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let bytes = hackathon_doc(&hackathon).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(doc.get("start_at").is_some());
        assert!(doc.get("end_at").is_some());
        assert_eq!(doc["tracks"], json!(["AI", "Web"]));
    }
}
