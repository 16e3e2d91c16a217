//! Liveness endpoint.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::HealthConfig;
use crate::error::ChannelError;

fn router() -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http())
}

async fn healthz_handler() -> &'static str {
    "OK"
}

/// Bind the health server and serve it until `shutdown` fires.
///
/// Returns the bound address (useful with port 0) and the serving task.
pub async fn start_server(
    config: &HealthConfig,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<()>), ChannelError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ChannelError::StartupFailed {
            name: "health".to_string(),
            reason: format!("Failed to bind to {}: {}", addr, e),
        })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| ChannelError::StartupFailed {
            name: "health".to_string(),
            reason: format!("Failed to get local addr: {}", e),
        })?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("Health endpoint shutting down");
            })
            .await
        {
            tracing::error!("Health server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Health endpoint listening");
    Ok((bound_addr, handle))
}
