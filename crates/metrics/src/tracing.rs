use scribe_models::{LogConfig, ScribeError};
use time::format_description::well_known::Rfc3339;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

pub struct TracingService;

impl TracingService {
    /// Installs the global subscriber. `RUST_LOG` takes precedence over
    /// `config.level`.
    pub fn init(config: &LogConfig) -> Result<(), ScribeError> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .map_err(|e| ScribeError::ConfigError {
                reason: format!("invalid log level {:?}: {}", config.level, e),
            })?;

        let result = match config.format.as_str() {
            "json" => tracing_subscriber::fmt()
                .json()
                .with_timer(UtcTime::new(Rfc3339))
                .with_env_filter(filter)
                .try_init(),
            "pretty" => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
            other => {
                return Err(ScribeError::ConfigError {
                    reason: format!("unknown log format: {other}"),
                })
            }
        };

        result.map_err(|e| ScribeError::InternalError {
            reason: e.to_string(),
        })
    }

    pub fn log_transcription_started(chat_id: i64, order_id: &str, url: &str) {
        info!(
            chat_id = chat_id,
            order_id = %order_id,
            url = %url,
            "Transcription started"
        );
    }

    pub fn log_poll_attempt(order_id: &str, attempt: u32, status: &str) {
        info!(
            order_id = %order_id,
            attempt = attempt,
            status = %status,
            "Polled transcript export"
        );
    }

    pub fn log_transcript_delivered(chat_id: i64, order_id: &str, delivery: &str, elapsed_secs: u64) {
        info!(
            chat_id = chat_id,
            order_id = %order_id,
            delivery = %delivery,
            elapsed_secs = elapsed_secs,
            "Transcript delivered"
        );
    }

    pub fn log_transcription_failed(chat_id: i64, order_id: Option<&str>, error_message: &str) {
        error!(
            chat_id = chat_id,
            order_id = %order_id.unwrap_or("none"),
            error_message = %error_message,
            "Transcription failed"
        );
    }

    pub fn log_build_step(stage: &str, instruction: &str, cache_key: &str, cached: bool) {
        info!(
            stage = %stage,
            instruction = %instruction,
            cache_key = %cache_key,
            cached = cached,
            "Build step"
        );
    }

    pub fn log_build_finished(image: &str, image_id: &str, executed: usize, duration_ms: u64) {
        info!(
            image = %image,
            image_id = %image_id,
            executed_steps = executed,
            duration_ms = duration_ms,
            "Build finished"
        );
    }

    pub fn log_build_failed(image: &str, error_message: &str) {
        warn!(
            image = %image,
            error_message = %error_message,
            "Build failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_is_a_config_error() {
        let config = LogConfig {
            format: "xml".to_string(),
            level: "info".to_string(),
        };
        assert!(matches!(
            TracingService::init(&config),
            Err(ScribeError::ConfigError { .. })
        ));
    }
}
