use anyhow::{anyhow, Result};
use scribe_api::{start_server, AppState};
use scribe_bot::TranscriptionService;
use scribe_metrics::{MetricsService, TracingService};
use scribe_models::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional explicit config file as the only argument
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    TracingService::init(&config.log)?;
    info!("Starting Scribe server");

    let metrics = Arc::new(MetricsService::new()?);
    let service = Arc::new(TranscriptionService::from_config(&config, metrics.clone())?);
    info!(
        "Polling Transkriptor every {}s{}",
        config.poll.interval_secs,
        config
            .poll
            .max_attempts
            .map(|n| format!(", at most {n} times"))
            .unwrap_or_default()
    );

    let state = AppState::new(&config.telegram.bot_token, service, metrics);
    start_server(config.server.bind.clone(), config.server.port, state)
        .await
        .map_err(|e| anyhow!(e))?;

    info!("Scribe server shut down");
    Ok(())
}
