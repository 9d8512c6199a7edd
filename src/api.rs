use anyhow::Context;
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use crate::{config::RelayConfig, handler::RelayState};

pub(crate) fn app_router(config: &RelayConfig, state: RelayState) -> Router {
    Router::new()
        .route(config.stream_path(), get(crate::handler::stream::ws_upgrade))
        .route("/status", get(crate::handler::system::status))
        .nest_service("/static", ServeDir::new(config.static_dir()))
        .with_state(state)
}

/// Binds the listener up front so a busy port fails startup instead of a background task.
pub(crate) async fn start_api_server(
    config: &RelayConfig,
    state: RelayState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = app_router(config, state);
    let listener = TcpListener::bind(config.listen())
        .await
        .with_context(|| format!("failed to bind {}", config.listen()))?;
    log::info!(
        "relay listening on {}, stream at {}",
        config.listen(),
        config.stream_path()
    );

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel.clone()))
            .await
        {
            log::error!("API server error: {}", e);
        }
        cancel.cancel();
    });
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("shutting down API server...");
}
