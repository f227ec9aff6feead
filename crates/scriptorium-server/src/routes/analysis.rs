//! Derived-artifact endpoints: style profiling, story-world extraction,
//! document text recovery.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scriptorium_provider::InlinePayload;
use scriptorium_schema::{KnowledgeGraph, StyleDna};

use crate::error::ApiError;
use crate::routes::ActorQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub actor_id: String,
    pub project_id: Uuid,
    /// Id of the script the analysis was run over, usually an episode id.
    pub script_id: Uuid,
    pub script: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub mime_type: String,
    /// Base64-encoded document bytes.
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/style", post(analyze_style))
        .route("/graph", post(analyze_graph))
        .route("/extract", post(extract_text))
        .route("/projects/{id}/style", get(latest_style))
        .route("/projects/{id}/graph", get(latest_graph))
        .route("/projects/{id}/style/{artifact_id}", delete(delete_style))
        .route("/projects/{id}/graph/{artifact_id}", delete(delete_graph))
}

async fn analyze_style(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<StyleDna>), ApiError> {
    let dna = state
        .analyzer
        .analyze_style(&body.actor_id, body.project_id, body.script_id, &body.script)
        .await?;
    Ok((StatusCode::CREATED, Json(dna)))
}

async fn analyze_graph(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<KnowledgeGraph>), ApiError> {
    let graph = state
        .analyzer
        .analyze_graph(&body.actor_id, body.project_id, body.script_id, &body.script)
        .await?;
    Ok((StatusCode::CREATED, Json(graph)))
}

async fn extract_text(
    State(state): State<AppState>,
    Json(body): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let text = state
        .analyzer
        .extract_document_text(&InlinePayload {
            mime_type: body.mime_type,
            data: body.data,
        })
        .await?;
    Ok(Json(ExtractResponse { text }))
}

async fn latest_style(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Option<StyleDna>>, ApiError> {
    state.engine.get_project(&query.actor, id).await?;
    Ok(Json(state.engine.store().latest_style_dna(id).await.map_err(
        scriptorium_core::EngineError::from,
    )?))
}

async fn latest_graph(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<Json<Option<KnowledgeGraph>>, ApiError> {
    state.engine.get_project(&query.actor, id).await?;
    Ok(Json(
        state
            .engine
            .store()
            .latest_knowledge_graph(id)
            .await
            .map_err(scriptorium_core::EngineError::from)?,
    ))
}

async fn delete_style(
    State(state): State<AppState>,
    Path((id, artifact_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ActorQuery>,
) -> Result<StatusCode, ApiError> {
    state.engine.get_project(&query.actor, id).await?;
    let removed = state
        .engine
        .store()
        .delete_style_dna(id, artifact_id)
        .await
        .map_err(scriptorium_core::EngineError::from)?;
    Ok(if removed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

async fn delete_graph(
    State(state): State<AppState>,
    Path((id, artifact_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ActorQuery>,
) -> Result<StatusCode, ApiError> {
    state.engine.get_project(&query.actor, id).await?;
    let removed = state
        .engine
        .store()
        .delete_knowledge_graph(id, artifact_id)
        .await
        .map_err(scriptorium_core::EngineError::from)?;
    Ok(if removed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use scriptorium_provider::{ProviderError, StubProvider, TextProvider};
    use scriptorium_store::{NewProject, Store};

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
        (state, stub, project.id)
    }

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn style_analysis_then_fetch_and_delete() {
        let (state, stub, project_id) = setup_state().await;
        stub.push_text(r#"{"voice": ["lyrical"], "confidence": 80}"#);
        let app = router().with_state(state);

        let body = format!(
            r#"{{"actor_id": "user-1", "project_id": "{project_id}",
                "script_id": "{}", "script": "INT. RUMAH - MALAM"}}"#,
            uuid::Uuid::new_v4()
        );
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/style")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let dna = body_json(response.into_body()).await;
        let dna_id = dna["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/projects/{project_id}/style?actor=user-1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let latest = body_json(response.into_body()).await;
        assert_eq!(latest["id"], dna_id.as_str());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/projects/{project_id}/style/{dna_id}?actor=user-1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/projects/{project_id}/style?actor=user-1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let latest = body_json(response.into_body()).await;
        assert!(latest.is_null());
    }

    #[tokio::test]
    async fn malformed_analysis_reply_is_bad_gateway() {
        let (state, stub, project_id) = setup_state().await;
        stub.push_text("no json in here");
        let app = router().with_state(state);

        let body = format!(
            r#"{{"actor_id": "user-1", "project_id": "{project_id}",
                "script_id": "{}", "script": "x"}}"#,
            uuid::Uuid::new_v4()
        );
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/graph")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn extract_falls_back_when_rate_limited() {
        let (state, stub, _project_id) = setup_state().await;
        stub.push_error(ProviderError::RateLimited("quota".into()));
        let app = router().with_state(state);

        // "INT. RUMAH" base64-encoded.
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/extract")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"mime_type": "text/plain", "data": "SU5ULiBSVU1BSA=="}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response.into_body()).await;
        assert_eq!(value["text"], "INT. RUMAH");
    }

    #[tokio::test]
    async fn foreign_actor_cannot_read_artifacts() {
        let (state, _stub, project_id) = setup_state().await;
        let app = router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/projects/{project_id}/style?actor=intruder"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
