pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use handlers::*;
pub use middleware::*;
pub use routes::*;
pub use state::*;

use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

pub fn app(state: AppState) -> Router {
    with_middleware_stack(build_router(state))
}

/// Serves on `listener` until `shutdown` resolves, then aborts any
/// transcription pollers still running.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let service = state.service.clone();
    let result = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await;
    service.shutdown();
    result
}

pub async fn start_server(
    bind: String,
    port: u16,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(format!("{}:{}", bind, port)).await?;
    info!("Webhook server listening on {}", listener.local_addr()?);

    serve(listener, state, shutdown_signal()).await?;
    info!("Webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
