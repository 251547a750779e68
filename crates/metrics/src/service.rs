use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
use scribe_models::ScribeError;
use tracing::{debug, instrument};

pub struct MetricsService {
    registry: Registry,
    webhook_updates_total: Counter,
    transcriptions_started_total: Counter,
    transcriptions_completed_total: Counter,
    transcriptions_failed_total: Counter,
    poll_attempts_total: Counter,
    transcription_duration_seconds: Histogram,
}

fn internal(e: prometheus::Error) -> ScribeError {
    ScribeError::InternalError {
        reason: e.to_string(),
    }
}

impl MetricsService {
    pub fn new() -> Result<Self, ScribeError> {
        let registry = Registry::new();

        let webhook_updates_total = Counter::new(
            "scribe_webhook_updates_total",
            "Total number of Telegram updates received on the webhook",
        )
        .map_err(internal)?;

        let transcriptions_started_total = Counter::new(
            "scribe_transcriptions_started_total",
            "Total number of transcription orders created",
        )
        .map_err(internal)?;

        let transcriptions_completed_total = Counter::new(
            "scribe_transcriptions_completed_total",
            "Total number of transcripts delivered to a chat",
        )
        .map_err(internal)?;

        let transcriptions_failed_total = Counter::new(
            "scribe_transcriptions_failed_total",
            "Total number of transcriptions that could not be created or retrieved",
        )
        .map_err(internal)?;

        let poll_attempts_total = Counter::new(
            "scribe_poll_attempts_total",
            "Total number of transcript export polls",
        )
        .map_err(internal)?;

        let transcription_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "scribe_transcription_duration_seconds",
                "Time from order creation to transcript delivery in seconds",
            )
            .buckets(vec![30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0]),
        )
        .map_err(internal)?;

        registry
            .register(Box::new(webhook_updates_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(transcriptions_started_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(transcriptions_completed_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(transcriptions_failed_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(poll_attempts_total.clone()))
            .map_err(internal)?;
        registry
            .register(Box::new(transcription_duration_seconds.clone()))
            .map_err(internal)?;

        Ok(Self {
            registry,
            webhook_updates_total,
            transcriptions_started_total,
            transcriptions_completed_total,
            transcriptions_failed_total,
            poll_attempts_total,
            transcription_duration_seconds,
        })
    }

    pub fn record_webhook_update(&self) {
        self.webhook_updates_total.inc();
    }

    #[instrument(skip(self))]
    pub fn record_transcription_started(&self, order_id: &str) {
        self.transcriptions_started_total.inc();
        debug!("Recorded transcription start: {}", order_id);
    }

    #[instrument(skip(self))]
    pub fn record_transcription_completed(&self, order_id: &str, duration_secs: f64) {
        self.transcriptions_completed_total.inc();
        self.transcription_duration_seconds.observe(duration_secs);
        debug!("Recorded transcription completion: {} after {}s", order_id, duration_secs);
    }

    pub fn record_transcription_failed(&self) {
        self.transcriptions_failed_total.inc();
    }

    pub fn record_poll_attempt(&self) {
        self.poll_attempts_total.inc();
    }

    pub fn get_prometheus_metrics(&self) -> Result<String, ScribeError> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer).map_err(internal)?;

        String::from_utf8(buffer).map_err(|e| ScribeError::InternalError {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_all_series() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_webhook_update();
        metrics.record_transcription_started("ord-1");
        metrics.record_poll_attempt();
        metrics.record_poll_attempt();
        metrics.record_transcription_completed("ord-1", 95.0);
        metrics.record_transcription_failed();

        let text = metrics.get_prometheus_metrics().unwrap();
        assert!(text.contains("scribe_webhook_updates_total 1"));
        assert!(text.contains("scribe_transcriptions_started_total 1"));
        assert!(text.contains("scribe_transcriptions_completed_total 1"));
        assert!(text.contains("scribe_transcriptions_failed_total 1"));
        assert!(text.contains("scribe_poll_attempts_total 2"));
        assert!(text.contains("scribe_transcription_duration_seconds_count 1"));
    }

    #[test]
    fn registries_are_independent() {
        let a = MetricsService::new().unwrap();
        let b = MetricsService::new().unwrap();
        a.record_webhook_update();
        assert!(b
            .get_prometheus_metrics()
            .unwrap()
            .contains("scribe_webhook_updates_total 0"));
    }
}
