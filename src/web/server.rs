//! Router assembly and server startup.

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::{link, ops};
use crate::bot::SharedBotHandler;
use crate::managers::{SharedBindingService, SharedDeliveryController};
use crate::platform::SharedPlatformApi;
use crate::state::SharedChatSessionStore;

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub binding: SharedBindingService,
    pub sessions: SharedChatSessionStore,
    pub delivery: SharedDeliveryController,
    pub platform: SharedPlatformApi,
    pub bot: SharedBotHandler,
}

/// Build the full API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ops::health))
        .route("/link/generate-code", post(link::generate_code))
        .route("/link/consume", post(link::consume))
        .route("/link/unbind", post(link::unbind))
        .route("/link/status", get(link::status))
        .route("/bot/mode/apply", post(ops::apply_mode))
        .route("/bot/mode", get(ops::get_mode))
        .route("/bot/mode/repair", post(ops::repair_mode))
        .route("/bot/update", post(ops::bot_update))
        .route("/sessions/cleanup", post(ops::cleanup_sessions))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve the API until the process exits.
pub async fn start_web_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Web server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
