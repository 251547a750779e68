use crate::jobs::JobRegistry;
use crate::telegram::TelegramClient;
use crate::transkriptor::TranskriptorClient;
use scribe_metrics::{MetricsService, TracingService};
use scribe_models::{ExportPayload, ExportStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DOCUMENT_CAPTION: &str = "Here is your transcript!";
pub const EMPTY_TRANSCRIPT_REPLY: &str = "Transcription completed but no content was returned.";

/// How a poller ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Transcript uploaded as `{order_id}.txt`.
    Document,
    /// Only a download link was available.
    Link(String),
    Empty,
    Failed(u16),
    GaveUp { attempts: u32 },
}

impl PollOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, PollOutcome::Document | PollOutcome::Link(_) | PollOutcome::Empty)
    }

    fn label(&self) -> &'static str {
        match self {
            PollOutcome::Document => "document",
            PollOutcome::Link(_) => "link",
            PollOutcome::Empty => "empty",
            PollOutcome::Failed(_) => "failed",
            PollOutcome::GaveUp { .. } => "gave-up",
        }
    }
}

pub struct Poller {
    telegram: Arc<TelegramClient>,
    transkriptor: Arc<TranskriptorClient>,
    metrics: Arc<MetricsService>,
    jobs: JobRegistry,
    interval: Duration,
    max_attempts: Option<u32>,
}

impl Poller {
    pub fn new(
        telegram: Arc<TelegramClient>,
        transkriptor: Arc<TranskriptorClient>,
        metrics: Arc<MetricsService>,
        jobs: JobRegistry,
        interval: Duration,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            telegram,
            transkriptor,
            metrics,
            jobs,
            interval,
            max_attempts,
        }
    }

    /// Polls the export endpoint until the transcript is ready, the export
    /// fails, or the attempt limit runs out, and tells `chat_id` the result.
    pub async fn run(&self, order_id: &str, chat_id: i64) -> PollOutcome {
        let started = Instant::now();
        let mut attempt = 0u32;

        let outcome = loop {
            attempt += 1;
            self.jobs.record_attempt(order_id);
            self.metrics.record_poll_attempt();

            match self.transkriptor.export_transcription(order_id).await {
                Ok(ExportStatus::Ready(payload)) => {
                    TracingService::log_poll_attempt(order_id, attempt, "ready");
                    break self.deliver(order_id, chat_id, payload).await;
                }
                Ok(ExportStatus::Processing) => {
                    TracingService::log_poll_attempt(order_id, attempt, "processing");
                }
                Ok(ExportStatus::Failed(status)) => {
                    TracingService::log_poll_attempt(order_id, attempt, "failed");
                    self.reply(
                        chat_id,
                        &format!("Failed to retrieve transcript (status: {status})."),
                    )
                    .await;
                    break PollOutcome::Failed(status);
                }
                Err(e) => {
                    warn!("Export poll for {} failed, will retry: {}", order_id, e);
                }
            }

            if self.max_attempts.is_some_and(|max| attempt >= max) {
                self.reply(chat_id, &format!("Gave up waiting for transcript {order_id}."))
                    .await;
                break PollOutcome::GaveUp { attempts: attempt };
            }
            tokio::time::sleep(self.interval).await;
        };

        let elapsed = started.elapsed();
        if outcome.delivered() {
            self.metrics
                .record_transcription_completed(order_id, elapsed.as_secs_f64());
            TracingService::log_transcript_delivered(
                chat_id,
                order_id,
                outcome.label(),
                elapsed.as_secs(),
            );
        } else {
            self.metrics.record_transcription_failed();
            TracingService::log_transcription_failed(chat_id, Some(order_id), outcome.label());
        }
        outcome
    }

    async fn deliver(&self, order_id: &str, chat_id: i64, payload: ExportPayload) -> PollOutcome {
        let content = payload.content.filter(|c| !c.is_empty());
        let link = payload.presigned_url.filter(|u| !u.is_empty());

        match (content, link) {
            (Some(content), _) => {
                let file_name = format!("{order_id}.txt");
                if let Err(e) = self
                    .telegram
                    .send_document(chat_id, &file_name, content.into_bytes(), DOCUMENT_CAPTION)
                    .await
                {
                    warn!("Failed to upload transcript {} to chat {}: {}", order_id, chat_id, e);
                }
                PollOutcome::Document
            }
            (None, Some(url)) => {
                self.reply(chat_id, &format!("Transcription is ready: {url}"))
                    .await;
                PollOutcome::Link(url)
            }
            (None, None) => {
                self.reply(chat_id, EMPTY_TRANSCRIPT_REPLY).await;
                PollOutcome::Empty
            }
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.telegram.send_message(chat_id, text, None).await {
            warn!("Failed to message chat {}: {}", chat_id, e);
        } else {
            info!("Notified chat {}", chat_id);
        }
    }
}
