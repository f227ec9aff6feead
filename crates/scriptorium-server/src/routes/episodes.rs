use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use scriptorium_schema::{AuditLog, Episode, ScriptVersion};
use scriptorium_store::EpisodePatch;

use crate::error::ApiError;
use crate::routes::ActorQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateEpisodeRequest {
    pub actor_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub setting: Option<String>,
    #[serde(default)]
    pub min_pages: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_episode).put(update_episode))
        .route("/{id}/audit", get(audit_logs))
        .route("/{id}/versions", get(script_versions))
}

async fn get_episode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Episode>, ApiError> {
    Ok(Json(state.engine.get_episode(&query.actor, id).await?))
}

async fn update_episode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateEpisodeRequest>,
) -> Result<Json<Episode>, ApiError> {
    let episode = state
        .engine
        .update_episode(
            &body.actor_id,
            id,
            EpisodePatch {
                title: body.title,
                synopsis: body.synopsis,
                setting: body.setting,
                min_pages: body.min_pages,
            },
        )
        .await?;
    Ok(Json(episode))
}

async fn audit_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Vec<AuditLog>>, ApiError> {
    Ok(Json(state.engine.audit_logs(&query.actor, id).await?))
}

async fn script_versions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Vec<ScriptVersion>>, ApiError> {
    Ok(Json(state.engine.script_versions(&query.actor, id).await?))
}
