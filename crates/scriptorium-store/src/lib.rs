pub mod migrations;
pub mod store;

pub use store::{
    EditBatch, EpisodePatch, NewEpisode, NewMessage, NewProject, ProjectPatch, Store,
};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} not found: {id}")]
    NotFound {
        collection: &'static str,
        id: String,
    },
    #[error("episode number {number} already exists in project {project_id}")]
    EpisodeNumberTaken { project_id: Uuid, number: u32 },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to lock sqlite connection")]
    Lock,
}

impl StoreError {
    pub fn not_found(collection: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            collection,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
