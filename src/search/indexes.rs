use elasticsearch::indices::{IndicesCreateParts, IndicesExistsParts};
use elasticsearch::Elasticsearch;
use serde_json::json;
use tracing::info;

use super::{SearchError, IDX_HACKATHONS, IDX_PROJECTS, IDX_USERS};

/// One-shot index bootstrap, invoked before the sync worker starts. Strict
/// dynamic mappings so a projector drifting from the mapping fails loudly
/// instead of polluting the index.
pub async fn ensure_indexes(client: &Elasticsearch) -> Result<(), SearchError> {
    ensure(
        client,
        IDX_USERS,
        json!({
            "settings": { "number_of_shards": 1 },
            "mappings": {
                "dynamic": "strict",
                "properties": {
                    "username": { "type": "keyword" },
                    "email": { "type": "keyword" },
                    "skills": { "type": "keyword" },
                    "college": { "type": "text" },
                    "updated_at": { "type": "date" }
                }
            }
        }),
    )
    .await?;

    ensure(
        client,
        IDX_HACKATHONS,
        json!({
            "settings": { "number_of_shards": 1 },
            "mappings": {
                "dynamic": "strict",
                "properties": {
                    "name": { "type": "text" },
                    "location": { "type": "keyword" },
                    "tracks": { "type": "keyword" },
                    "start_at": { "type": "date" },
                    "end_at": { "type": "date" },
                    "updated_at": { "type": "date" }
                }
            }
        }),
    )
    .await?;

    ensure(
        client,
        IDX_PROJECTS,
        json!({
            "settings": { "number_of_shards": 1 },
            "mappings": {
                "dynamic": "strict",
                "properties": {
                    "name": { "type": "text" },
                    "description": { "type": "text" },
                    "hackathon_id": { "type": "keyword" },
                    "owner_id": { "type": "keyword" },
                    "team_members": { "type": "keyword" },
                    "updated_at": { "type": "date" }
                }
            }
        }),
    )
    .await
}

async fn ensure(
    client: &Elasticsearch,
    index: &str,
    body: serde_json::Value,
) -> Result<(), SearchError> {
    let exists = client
        .indices()
        .exists(IndicesExistsParts::Index(&[index]))
        .send()
        .await?;

    if exists.status_code().is_success() {
        return Ok(());
    }

    let response = client
        .indices()
        .create(IndicesCreateParts::Index(index))
        .body(body)
        .send()
        .await?;

    if !response.status_code().is_success() {
        return Err(SearchError::IndexCreate {
            index: index.to_string(),
            status: response.status_code().as_u16(),
        });
    }

    info!(index, "created search index");
    Ok(())
}
