//! Thread endpoints: reading the conversation, sending messages, editing.

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scriptorium_core::{EditRequest, Intent, SendRequest};
use scriptorium_schema::{ChatMessage, ContextContinuity, GenerationModes, MessageEdit};

use crate::error::ApiError;
use crate::routes::ActorQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub actor_id: String,
    pub content: String,
    #[serde(default)]
    pub modes: Option<GenerationModes>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub user_message: ChatMessage,
    pub response: ChatMessage,
    pub intent: Intent,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub actor_id: String,
    pub new_content: String,
    #[serde(default)]
    pub edit_reason: Option<String>,
    /// Omitting the flag means "regenerate", matching the editor UI.
    #[serde(default = "default_regenerate")]
    pub regenerate_response: bool,
    #[serde(default)]
    pub modes: Option<GenerationModes>,
}

fn default_regenerate() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct EditMessageResponse {
    pub edited_message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_response: Option<ChatMessage>,
    pub deleted_message_ids: Vec<Uuid>,
    pub audit_log_id: Uuid,
    pub continuity: ContextContinuity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regeneration_error: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/messages", get(thread).post(send_message))
        .route("/{id}/messages/{message_id}", put(edit_message))
}

/// Routes keyed by message id rather than episode id.
pub fn edits_router() -> Router<AppState> {
    Router::new().route("/{id}/edits", get(message_edits))
}

async fn thread(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    Ok(Json(state.engine.thread(&query.actor, id).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let episode = state.engine.get_episode(&body.actor_id, id).await?;
    let outcome = state
        .engine
        .send_message(
            &body.actor_id,
            SendRequest {
                project_id: episode.project_id,
                episode_id: episode.id,
                content: body.content,
                modes: body.modes.unwrap_or_default(),
            },
            None,
        )
        .await?;
    Ok(Json(SendMessageResponse {
        user_message: outcome.user_message,
        response: outcome.response,
        intent: outcome.intent,
    }))
}

async fn edit_message(
    State(state): State<AppState>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<EditMessageResponse>, ApiError> {
    let episode = state.engine.get_episode(&body.actor_id, id).await?;
    let outcome = state
        .engine
        .edit_message(
            &body.actor_id,
            EditRequest {
                project_id: episode.project_id,
                episode_id: episode.id,
                message_id,
                new_content: body.new_content,
                edit_reason: body.edit_reason,
                regenerate_response: body.regenerate_response,
                modes: body.modes.unwrap_or_default(),
            },
            None,
        )
        .await?;
    Ok(Json(EditMessageResponse {
        edited_message: outcome.edited_message,
        new_response: outcome.new_response,
        deleted_message_ids: outcome.deleted_message_ids,
        audit_log_id: outcome.audit_log_id,
        continuity: outcome.continuity,
        regeneration_error: outcome.regeneration_error,
    }))
}

async fn message_edits(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Vec<MessageEdit>>, ApiError> {
    Ok(Json(state.engine.message_edits(&query.actor, id).await?))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use scriptorium_provider::{ProviderError, StubProvider, TextProvider};
    use scriptorium_store::{NewEpisode, NewProject, Store};

    use super::router;
    use crate::state::AppState;

    async fn setup_state() -> (AppState, Arc<StubProvider>, uuid::Uuid) {
        let store = Store::open_in_memory().unwrap();
        let stub = Arc::new(StubProvider::new());
        let state = AppState::new(store, stub.clone() as Arc<dyn TextProvider>);
        let project = state
            .engine
            .create_project(NewProject {
                user_id: "user-1".into(),
                title: "Senja di Jakarta".into(),
                genre: None,
                synopsis: None,
                tone: None,
                total_episodes: 12,
            })
            .await
            .unwrap();
        let episode = state
            .engine
            .create_episode(
                "user-1",
                NewEpisode {
                    project_id: project.id,
                    episode_number: 1,
                    title: "Pilot".into(),
                    synopsis: Some("Maya returns.".into()),
                    setting: None,
                    min_pages: 40,
                },
            )
            .await
            .unwrap();
        (state, stub, episode.id)
    }

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn send_message_returns_both_sides() {
        let (state, stub, episode_id) = setup_state().await;
        stub.push_text("Maya bisa lebih ragu.");
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/{episode_id}/messages"))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"actor_id": "user-1", "content": "Bagaimana karakter Maya?"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response.into_body()).await;
        assert_eq!(value["intent"], "conversation");
        assert_eq!(value["response"]["content"], "Maya bisa lebih ragu.");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{episode_id}/messages?actor=user-1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let thread = body_json(response.into_body()).await;
        assert_eq!(thread.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn edit_truncates_and_reports() {
        let (state, stub, episode_id) = setup_state().await;
        stub.push_text("Balasan pertama.");
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/{episode_id}/messages"))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"actor_id": "user-1", "content": "Pertanyaan awal?"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let sent = body_json(response.into_body()).await;
        let message_id = sent["user_message"]["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/{episode_id}/messages/{message_id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"actor_id": "user-1", "new_content": "Pertanyaan diubah?", "regenerate_response": false}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response.into_body()).await;
        assert_eq!(value["edited_message"]["content"], "Pertanyaan diubah?");
        assert_eq!(value["deleted_message_ids"].as_array().unwrap().len(), 1);
        assert!(value.get("new_response").is_none());

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{episode_id}/messages?actor=user-1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let thread = body_json(response.into_body()).await;
        assert_eq!(thread.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn provider_quota_maps_to_429() {
        let (state, stub, episode_id) = setup_state().await;
        stub.push_error(ProviderError::RateLimited("quota exceeded".into()));
        let app = router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/{episode_id}/messages"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"actor_id": "user-1", "content": "halo"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn editing_unknown_message_is_not_found() {
        let (state, _stub, episode_id) = setup_state().await;
        let app = router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/{episode_id}/messages/{}", uuid::Uuid::new_v4()))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"actor_id": "user-1", "new_content": "x"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
