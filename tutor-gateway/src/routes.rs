//! Route definitions for the tutor gateway.
//!
//! Provides the chat page, the chat WebSocket, the image form, and health checks.

use crate::image::{ImageError, ImageRequestHandler};
use crate::pages::Pages;
use crate::relay::CompletionRelay;
use crate::session::{SessionKey, SessionStore};
use crate::ws::{ws_handler, ChatQuery};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Form, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub relay: Arc<CompletionRelay>,
    pub images: Arc<ImageRequestHandler>,
    pub pages: Arc<Pages>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Image form body.
#[derive(Debug, Deserialize)]
pub struct ImageForm {
    #[serde(default)]
    pub user_input: String,
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

/// Build the complete router with all routes.
pub fn build_all_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(chat_page))
        .route("/ws", get(ws_handler))
        .route("/image", get(image_page).post(create_image))
        .merge(health_routes())
        .with_state(state)
}

/// Health routes, usable with any router state.
pub fn health_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(health_handler))
}

// ─────────────────────────────────────────────────────────────────────────────
// Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn render_error(e: impl std::fmt::Display) -> ErrorReply {
    tracing::error!(error = %e, "Page render failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
            code: "render_error".into(),
        }),
    )
}

/// Chat page; `?session=` shows that session's history.
async fn chat_page(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> Result<Response, ErrorReply> {
    let history = match query.session.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => state.sessions.snapshot(&SessionKey::from(s)).await,
        _ => Vec::new(),
    };

    let body = state.pages.render_home(&history).map_err(render_error)?;
    Ok((
        [
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, max-age=0",
            ),
            (header::PRAGMA, "no-cache"),
        ],
        Html(body),
    )
        .into_response())
}

async fn image_page(State(state): State<AppState>) -> Result<Html<String>, ErrorReply> {
    state
        .pages
        .render_image(None, None)
        .map(Html)
        .map_err(render_error)
}

/// Generate an image from the `user_input` form field.
async fn create_image(
    State(state): State<AppState>,
    Form(form): Form<ImageForm>,
) -> Result<Html<String>, ErrorReply> {
    let url = state
        .images
        .generate(&form.user_input)
        .await
        .map_err(image_error)?;

    state
        .pages
        .render_image(Some(form.user_input.trim()), Some(&url))
        .map(Html)
        .map_err(render_error)
}

fn image_error(e: ImageError) -> ErrorReply {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().into(),
        }),
    )
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "tutor-gateway".into(),
    })
}
