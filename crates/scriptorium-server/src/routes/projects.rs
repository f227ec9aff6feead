use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use scriptorium_schema::{Episode, Project};
use scriptorium_store::{NewEpisode, NewProject, ProjectPatch};

use crate::error::ApiError;
use crate::routes::ActorQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default = "default_total_episodes")]
    pub total_episodes: u32,
}

fn default_total_episodes() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub actor_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub total_episodes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEpisodeRequest {
    pub actor_id: String,
    pub episode_number: u32,
    pub title: String,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub setting: Option<String>,
    #[serde(default = "default_min_pages")]
    pub min_pages: u32,
}

fn default_min_pages() -> u32 {
    40
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/{id}/episodes", get(list_episodes).post(create_episode))
}

async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = state
        .engine
        .create_project(NewProject {
            user_id: body.user_id,
            title: body.title,
            genre: body.genre,
            synopsis: body.synopsis,
            tone: body.tone,
            total_episodes: body.total_episodes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.engine.list_projects(&query.actor).await?))
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.engine.get_project(&query.actor, id).await?))
}

async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let project = state
        .engine
        .update_project(
            &body.actor_id,
            id,
            ProjectPatch {
                title: body.title,
                genre: body.genre,
                synopsis: body.synopsis,
                tone: body.tone,
                total_episodes: body.total_episodes,
            },
        )
        .await?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_project(&query.actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_episode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateEpisodeRequest>,
) -> Result<(StatusCode, Json<Episode>), ApiError> {
    let episode = state
        .engine
        .create_episode(
            &body.actor_id,
            NewEpisode {
                project_id: id,
                episode_number: body.episode_number,
                title: body.title,
                synopsis: body.synopsis,
                setting: body.setting,
                min_pages: body.min_pages,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(episode)))
}

async fn list_episodes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Vec<Episode>>, ApiError> {
    Ok(Json(state.engine.list_episodes(&query.actor, id).await?))
}
