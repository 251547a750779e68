use scribe_bot::TranscriptionService;
use scribe_metrics::MetricsService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Only `/webhook/<bot_token>` is served.
    pub bot_token: Arc<str>,
    pub service: Arc<TranscriptionService>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    pub fn new(
        bot_token: &str,
        service: Arc<TranscriptionService>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            bot_token: Arc::from(bot_token),
            service,
            metrics,
        }
    }
}
