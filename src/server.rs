//! HTTP transport: a thin axum shim over [`Assistant`].
//!
//! | Route       | Method | Body |
//! |-------------|--------|------|
//! | `/api/`     | POST   | `{"question": "...", "image": "<base64>"}` → `{"answer", "links"}` |
//! | `/`         | GET    | liveness message |
//!
//! The body is taken as raw bytes so the pipeline, not axum's extractor,
//! decides what counts as malformed. Errors render as `{"detail": "..."}`.
//! Bodies up to [`MAX_BODY_BYTES`] are accepted so base64 screenshots fit.

use crate::answer::Assistant;
use crate::error::{ErrorKind, TaError};
use crate::output::AnswerResponse;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Largest accepted request body. axum's own default is 2 MB.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build the application router.
pub fn router(assistant: Arc<Assistant>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/", post(answer_question))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(assistant)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(assistant: Arc<Assistant>, addr: SocketAddr) -> Result<(), TaError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TaError::Internal(format!("bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(assistant))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| TaError::Internal(format!("server: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        return;
    }
    info!("Shutting down");
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({"message": "virtual-ta is running"}))
}

async fn answer_question(
    State(assistant): State<Arc<Assistant>>,
    body: Bytes,
) -> Result<Json<AnswerResponse>, ApiError> {
    let response = assistant.answer_body(&body).await?;
    Ok(Json(response))
}

/// A [`TaError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TaError);

impl From<TaError> for ApiError {
    fn from(e: TaError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match (&self.0, self.0.kind()) {
            (_, ErrorKind::Client) => StatusCode::BAD_REQUEST,
            (TaError::CompletionUnavailable { .. } | TaError::CompletionProtocol { .. }, _) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Rejected request: {}", self.0);
        }
        (status, Json(json!({"detail": self.0.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError(TaError::MissingQuestion).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError(TaError::CompletionUnavailable {
                attempts: 3,
                cause: BackendError::Timeout { secs: 60 },
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(TaError::CompletionProtocol {
                raw_response: "{}".into()
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(TaError::Internal("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
