use crate::commands::{create_failed_reply, started_reply, Command, HELP_REPLY, USAGE_REPLY};
use crate::jobs::JobRegistry;
use crate::poller::Poller;
use crate::telegram::TelegramClient;
use crate::transkriptor::TranskriptorClient;
use reqwest::Client;
use scribe_metrics::{MetricsService, TracingService};
use scribe_models::{Config, ScribeError, Update};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What an update led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No message or edited message in the update.
    Ignored,
    Usage,
    Help,
    Started { order_id: String },
    CreateFailed { detail: String },
}

pub struct TranscriptionService {
    telegram: Arc<TelegramClient>,
    transkriptor: Arc<TranskriptorClient>,
    poller: Arc<Poller>,
    jobs: JobRegistry,
    metrics: Arc<MetricsService>,
}

impl TranscriptionService {
    pub fn new(
        telegram: Arc<TelegramClient>,
        transkriptor: Arc<TranskriptorClient>,
        metrics: Arc<MetricsService>,
        interval: Duration,
        max_attempts: Option<u32>,
    ) -> Self {
        let jobs = JobRegistry::new();
        let poller = Arc::new(Poller::new(
            telegram.clone(),
            transkriptor.clone(),
            metrics.clone(),
            jobs.clone(),
            interval,
            max_attempts,
        ));
        Self {
            telegram,
            transkriptor,
            poller,
            jobs,
            metrics,
        }
    }

    /// Requires the bot token and the Transkriptor key to be configured.
    pub fn from_config(config: &Config, metrics: Arc<MetricsService>) -> Result<Self, ScribeError> {
        config.validate_service()?;
        let http = Client::builder().build()?;
        Ok(Self::new(
            Arc::new(TelegramClient::new(http.clone(), &config.telegram)),
            Arc::new(TranskriptorClient::new(http, &config.transkriptor)),
            metrics,
            Duration::from_secs(config.poll.interval_secs),
            config.poll.max_attempts,
        ))
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn telegram(&self) -> &TelegramClient {
        &self.telegram
    }

    #[instrument(skip(self, update), fields(update_id = update.update_id))]
    pub async fn handle_update(&self, update: &Update) -> UpdateOutcome {
        let Some(message) = update.message() else {
            debug!("Update carries no message, ignoring");
            return UpdateOutcome::Ignored;
        };
        let chat_id = message.chat.id;

        match Command::parse(message.trimmed_text()) {
            Command::TranscribeUsage => {
                self.reply(chat_id, USAGE_REPLY).await;
                UpdateOutcome::Usage
            }
            Command::Unknown => {
                self.reply(chat_id, HELP_REPLY).await;
                UpdateOutcome::Help
            }
            Command::Transcribe { url } => match self.transkriptor.create_transcription(&url).await {
                Ok(order_id) => {
                    self.metrics.record_transcription_started(&order_id);
                    TracingService::log_transcription_started(chat_id, &order_id, &url);
                    self.reply(chat_id, &started_reply(&order_id)).await;
                    self.start_polling(&order_id, chat_id);
                    UpdateOutcome::Started { order_id }
                }
                Err(e) => {
                    let detail = e.upstream_detail();
                    self.metrics.record_transcription_failed();
                    TracingService::log_transcription_failed(chat_id, None, &e.to_string());
                    self.reply(chat_id, &create_failed_reply(&detail)).await;
                    UpdateOutcome::CreateFailed { detail }
                }
            },
        }
    }

    /// Starts a background poller for `order_id` unless one is running.
    pub fn start_polling(&self, order_id: &str, chat_id: i64) -> bool {
        let poller = self.poller.clone();
        let id = order_id.to_string();
        let spawned = self.jobs.spawn(order_id, chat_id, async move {
            poller.run(&id, chat_id).await;
        });
        if spawned {
            info!("Polling transcript {} for chat {}", order_id, chat_id);
        }
        spawned
    }

    pub fn shutdown(&self) -> usize {
        self.jobs.abort_all()
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.telegram.send_message(chat_id, text, None).await {
            warn!("Failed to reply to chat {}: {}", chat_id, e);
        }
    }
}
