// HTTP surface: team content routes and the AI co-founder endpoints

pub mod error;
pub mod handlers;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::database::sqlite::Database;
use crate::indexer::EmbeddingQueue;
use crate::rag::CoFounder;

pub use error::{ApiError, ApiResult};

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub queue: EmbeddingQueue,
    pub cofounder: CoFounder,
}

/// Create the API router
#[inline]
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        // Spaces
        .route("/api/spaces", post(handlers::create_space))
        .route("/api/spaces/join", post(handlers::join_space))
        .route("/api/spaces/:id", get(handlers::get_space))
        // Team content
        .route("/api/messages", post(handlers::create_message))
        .route("/api/messages/:space_id", get(handlers::list_messages))
        .route("/api/journal", post(handlers::create_journal_entry))
        .route(
            "/api/journal/:id",
            get(handlers::list_journal)
                .put(handlers::update_journal_entry)
                .delete(handlers::delete_journal_entry),
        )
        .route("/api/documents", post(handlers::create_document))
        .route(
            "/api/documents/:id",
            get(handlers::list_documents)
                .put(handlers::update_document)
                .delete(handlers::delete_document),
        )
        .route("/api/tasks", post(handlers::create_task))
        .route(
            "/api/tasks/:id",
            get(handlers::list_tasks)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        // AI co-founder
        .route("/api/ai/chat", post(handlers::chat))
        .route("/api/ai/search", post(handlers::search))
        .route("/api/ai/indexing", get(handlers::indexing_stats))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin when none are configured, otherwise only the listed ones
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Serve `router` on `addr` until `shutdown` resolves
#[inline]
pub async fn serve<F>(router: Router, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}
