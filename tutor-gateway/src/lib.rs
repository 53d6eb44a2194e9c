//! Tutor Gateway - Streaming chat relay and image endpoint.
//!
//! This crate provides the HTTP/WebSocket service in front of an
//! OpenAI-compatible provider:
//! - Per-session conversation transcripts
//! - Token-by-token relay of streamed completions over WebSocket
//! - Prompt → image reference endpoint
//! - Chat and image pages
//!
//! ## Architecture
//!
//! ```text
//! Browser ⇄ /ws → SessionStore → CompletionRelay → provider (SSE stream)
//!                      ↑                ↓ fragments
//!                      └── assistant ←──┘
//! Browser → POST /image → ImageRequestHandler → provider
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod image;
pub mod pages;
pub mod provider;
pub mod relay;
pub mod routes;
pub mod session;
pub mod ws;

pub use image::{ImageError, ImageRequestHandler};
pub use provider::{
    ChatRequest, CompletionProvider, FragmentStream, ImageProvider, ImageRequest, ImageResponse,
    Message, OpenAIProvider, ProviderError,
};
pub use relay::{CompletionRelay, FragmentSink, RelayError, RelaySettings, SinkClosed};
pub use routes::AppState;
pub use session::{Role, SessionKey, SessionStore, Transcript, Turn};

use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tutor_common::config::Config;

/// Upper bound for plain HTTP requests; upgraded sockets are not affected.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Assemble application state around the given providers.
pub fn build_state(
    config: &Config,
    completions: Arc<dyn CompletionProvider>,
    images: Arc<dyn ImageProvider>,
) -> anyhow::Result<AppState> {
    let sessions = Arc::new(SessionStore::new(config.relay.persona.clone()));
    let relay = CompletionRelay::new(
        Arc::clone(&sessions),
        completions,
        RelaySettings::from_config(config),
    );
    let pages = pages::Pages::new().context("Failed to compile page templates")?;

    Ok(AppState {
        sessions,
        relay: Arc::new(relay),
        images: Arc::new(ImageRequestHandler::new(images, &config.image)),
        pages: Arc::new(pages),
    })
}

/// Build state backed by the configured OpenAI-compatible upstream.
///
/// Fails when no credential is configured.
pub fn build_default_state(config: &Config) -> anyhow::Result<AppState> {
    let api_key = config.api_key().ok_or_else(|| {
        tutor_common::Error::Config("upstream.api_key (OPENAI_API_KEY) is not set".into())
    })?;

    let provider = Arc::new(OpenAIProvider::with_base_url(
        api_key,
        &config.upstream.base_url,
        Duration::from_secs(config.upstream.timeout_secs),
    ));

    build_state(config, provider.clone(), provider)
}

/// Build the gateway router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_all_routes(state)
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(cors)
}

/// Start the gateway server and run until Ctrl-C.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    let router = build_router(build_default_state(config)?);

    tracing::info!("Starting Tutor Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Tutor Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
