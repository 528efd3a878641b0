//! Axum HTTP routes for the random image API.

use crate::config::ServerConfig;
use crate::error::{AppError, ServeError};
use crate::selector::CancelFlag;
use crate::server::context::SharedState;
use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::SecondsFormat;
use std::net::SocketAddr;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Response header carrying the image's modification time
pub const X_CREATION_DATE: HeaderName = HeaderName::from_static("x-creation-date");

// ─── Route builder ───────────────────────────────────────────────

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/getRandomImage",
            get(get_random_image).options(preflight),
        )
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .with_state(state)
}

// ─── Handlers ────────────────────────────────────────────────────

async fn get_random_image(State(state): State<SharedState>) -> Result<Response, ServeError> {
    let cancel = CancelFlag::new();
    // Raised if this future is dropped (client went away)
    let guard = cancel.cancel_on_drop();

    let result = tokio::task::spawn_blocking(move || {
        state.service.serve_random_image_until(&cancel)
    })
    .await;
    guard.disarm();

    let image = match result {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => {
            if e.status_code() == StatusCode::NOT_FOUND {
                info!("Random image not found: {}", e);
            } else {
                warn!("Random image failed: {}", e);
            }
            return Err(e);
        }
        Err(join_err) => {
            error!("Random image task failed: {}", join_err);
            return Err(ServeError::Internal(join_err.to_string()));
        }
    };

    debug!(path = %image.path, content_type = image.content_type, "Random image served");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(image.content_type),
    );
    if let Some(modified) = image.modified {
        let stamp = modified.to_rfc3339_opts(SecondsFormat::Secs, true);
        if let Ok(value) = HeaderValue::from_str(&stamp) {
            headers.insert(X_CREATION_DATE, value);
        }
    }

    Ok((StatusCode::OK, headers, image.bytes).into_response())
}

/// CORS preflight; the headers come from the router layers
async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "sftp-image-server",
        "remote": state.service.tree().describe(),
        "indexed_directories": state.service.index().len(),
        "started_at": state.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        "walk": state.walk,
    }))
}

// ─── Server startup ──────────────────────────────────────────────

/// Start the HTTP server and run until Ctrl-C
///
/// The index must already be built: this is only called once the walk
/// has returned.
pub async fn serve(config: &ServerConfig, state: SharedState) -> Result<(), AppError> {
    let addr: SocketAddr = config.resolve_bind_addr().await?;
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    info!("API endpoints:");
    info!("  GET     /getRandomImage");
    info!("  OPTIONS /getRandomImage");
    info!("  GET     /health");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down gracefully...");
}
