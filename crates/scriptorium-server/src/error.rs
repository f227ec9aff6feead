use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use scriptorium_core::EngineError;
use scriptorium_provider::ProviderError;
use scriptorium_store::StoreError;

/// Engine error carried out of a handler, mapped to an HTTP status.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            EngineError::Store(StoreError::EpisodeNumberTaken { .. }) => StatusCode::CONFLICT,
            EngineError::Provider(ProviderError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            EngineError::SectionFailed { source, .. } if source.is_rate_limited() => {
                StatusCode::TOO_MANY_REQUESTS
            }
            EngineError::Provider(ProviderError::MalformedOutput(_))
            | EngineError::Provider(ProviderError::EmptyResponse)
            | EngineError::SectionFailed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
