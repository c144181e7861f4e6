use crate::api::api_router;
use crate::push_ws::push_router;
use crate::state::AppState;
/// HTTP server: spawns axum on a background tokio task.
use axum::Router;
use std::future::Future;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_router()
        .merge(push_router())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves. Returns the bound port, which
/// differs from `state.port` when that is 0.
pub async fn spawn_server(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(u16, JoinHandle<()>), std::io::Error> {
    let bind_addr = state.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, state.port)).await?;
    let actual_port = listener.local_addr()?.port();

    let app = build_router(AppState {
        port: actual_port,
        ..state
    });

    log::info!(
        target: "taskboard.server",
        "HTTP server listening on http://{}:{}",
        bind_addr,
        actual_port
    );

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            log::error!(target: "taskboard.server", "HTTP server exited with error: {}", e);
        }
    });

    Ok((actual_port, handle))
}
