//! Axum front end.
//!
//! Thin adapters from network requests to the orchestration service, gated
//! by the per-route sliding-window limiters. The static upload/query page is
//! served as the router fallback.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use state::ServerState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the router with both quota-gated image endpoints, the probe
/// routes, and the static front end.
pub fn build_router(state: Arc<ServerState>) -> Router {
    let embed = Router::new()
        .route("/image/embed", post(routes::embed_image))
        .layer(from_fn_with_state(state.clone(), middleware::embed_quota));
    let detect = Router::new()
        .route("/image/detect", post(routes::detect_image))
        .layer(from_fn_with_state(state.clone(), middleware::detect_quota));

    Router::new()
        .route("/api", get(routes::api_info))
        .route("/health", get(routes::health_check))
        .merge(embed)
        .merge(detect)
        .fallback_service(
            ServeDir::new(&state.config.static_dir)
                .not_found_service(routes::not_found.into_service()),
        )
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(from_fn(middleware::log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve until SIGTERM or Ctrl+C.
pub async fn start_server(state: Arc<ServerState>) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&state.config.upload_dir).await?;

    let addr: SocketAddr = state.config.socket_addr()?;
    tracing::info!(
        %addr,
        quota = state.config.quota_max_requests,
        window_hours = state.config.quota_window_hours,
        "starting objsearch server"
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
