use elasticsearch::http::transport::{BuildError, SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::Elasticsearch;
use thiserror::Error;
use url::Url;

use crate::models::EntityKind;

pub mod bulk;
pub mod documents;
mod indexes;

pub use indexes::ensure_indexes;

pub const IDX_USERS: &str = "users_v1";
pub const IDX_HACKATHONS: &str = "hackathons_v1";
pub const IDX_PROJECTS: &str = "projects_v1";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid Elasticsearch URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("failed to build transport: {0}")]
    TransportBuild(#[from] BuildError),

    #[error("transport error: {0}")]
    Transport(#[from] elasticsearch::Error),

    #[error("create index {index}: status={status}")]
    IndexCreate { index: String, status: u16 },

    #[error("bulk request failed: status={0}")]
    BulkStatus(u16),

    #[error("bulk dispatcher closed")]
    DispatcherClosed,
}

pub fn connect(url: &str) -> Result<Elasticsearch, SearchError> {
    let parsed = Url::parse(url)?;
    let pool = SingleNodeConnectionPool::new(parsed);
    let transport = TransportBuilder::new(pool).build()?;
    Ok(Elasticsearch::new(transport))
}

/// Target index for an entity kind. Document ids in the index equal the
/// entity UUID.
pub fn index_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => IDX_USERS,
        EntityKind::Hackathon => IDX_HACKATHONS,
        EntityKind::Project => IDX_PROJECTS,
    }
}
