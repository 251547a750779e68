use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::Json,
};
use scribe_models::{ErrorShape, ScribeError, Update};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

pub const ACTIVE_JOBS_HEADER: &str = "x-scribe-active-jobs";

type ApiError = (StatusCode, Json<ErrorShape>);

fn error_response(e: &ScribeError) -> ApiError {
    (
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(e.to_error_shape()),
    )
}

/// Telegram posts every update here. The update is handled before the
/// response is sent.
#[instrument(skip(state, token, body), fields(size = body.len()))]
pub async fn telegram_webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    if token != *state.bot_token {
        warn!("Webhook called with an unknown token");
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorShape {
                error_message: "Not Found".to_string(),
                error_type: "ResourceNotFoundException".to_string(),
            }),
        ));
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        error_response(&ScribeError::InvalidUpdate {
            reason: e.to_string(),
        })
    })?;
    state.metrics.record_webhook_update();

    if payload.is_null() || payload.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(Json(json!({})));
    }

    match serde_json::from_value::<Update>(payload) {
        Ok(update) => {
            let outcome = state.service.handle_update(&update).await;
            info!("Handled update {}: {:?}", update.update_id, outcome);
        }
        Err(e) => {
            warn!("Ignoring update with unexpected shape: {}", e);
        }
    }

    Ok(Json(json!({})))
}

pub async fn health_check(
    State(state): State<AppState>,
) -> ([(HeaderName, HeaderValue); 1], &'static str) {
    let active = HeaderValue::from(state.service.jobs().len());
    ([(HeaderName::from_static(ACTIVE_JOBS_HEADER), active)], "OK")
}

#[instrument(skip(state))]
pub async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    match state.metrics.get_prometheus_metrics() {
        Ok(metrics) => Ok(metrics),
        Err(e) => {
            error!("Failed to get metrics: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
