use crate::{handlers::*, AppState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Telegram webhook
        .route("/webhook/:token", post(telegram_webhook))
        // Health and metrics
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics))
}

pub fn build_router(state: AppState) -> Router {
    create_router().with_state(state)
}
