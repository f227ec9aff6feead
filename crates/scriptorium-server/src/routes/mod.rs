pub mod analysis;
pub mod chat;
pub mod episodes;
pub mod projects;

use axum::Router;
use serde::Deserialize;

use crate::state::AppState;

/// Caller identity for read endpoints, passed as `?actor=`.
#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor: String,
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/projects", projects::router())
        .nest("/episodes", episodes::router().merge(chat::router()))
        .nest("/messages", chat::edits_router())
        .nest("/analysis", analysis::router())
}
