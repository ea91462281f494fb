use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use stream_api::Readiness;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("bind health :{port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("health serve: {0}")]
    Serve(std::io::Error),
}

/// Liveness and readiness routes.
///
/// `GET /health` answers as long as the process serves requests,
/// `GET /ready` only once the engine flipped `readiness`.
pub fn router(readiness: Readiness) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .with_state(readiness)
}

/// Serve the health routes on `0.0.0.0:port` until `shutdown` is cancelled.
pub async fn run(port: u16, readiness: Readiness, shutdown: CancellationToken) -> Result<(), HealthError> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|source| HealthError::Bind { port, source })?;

    tracing::info!(port, "health server listening");

    axum::serve(listener, router(readiness))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(HealthError::Serve)?;

    Ok(())
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn handle_ready(State(readiness): State<Readiness>) -> impl IntoResponse {
    if readiness.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
