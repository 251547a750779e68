use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use scribe_models::{ScribeError, SendMessageRequest, SetWebhookRequest, TelegramConfig, TelegramResponse};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    base: String,
    max_message_len: usize,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl TelegramClient {
    pub fn new(http: Client, config: &TelegramConfig) -> Self {
        Self {
            http,
            base: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            max_message_len: config.max_message_len.max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }

    async fn call<T: Serialize + ?Sized>(&self, method: &str, params: &T) -> Result<(), ScribeError> {
        let request = self
            .http
            .post(self.method_url(method))
            .timeout(self.request_timeout)
            .json(params);
        self.send(method, request).await
    }

    async fn send(&self, method: &str, request: RequestBuilder) -> Result<(), ScribeError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ScribeError::Telegram {
                method: method.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<TelegramResponse>(&body) {
            Ok(TelegramResponse { ok: true, .. }) => Ok(()),
            Ok(TelegramResponse { description, .. }) => Err(ScribeError::Telegram {
                method: method.to_string(),
                status: status.as_u16(),
                body: description.unwrap_or(body),
            }),
            Err(e) => Err(ScribeError::InvalidResponse {
                reason: format!("{method}: {e}"),
            }),
        }
    }

    /// Sends `text`, split into as many messages as the length limit needs.
    /// Empty text sends nothing.
    #[instrument(skip(self, text), fields(len = text.chars().count()))]
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), ScribeError> {
        let parts = split_message(text, self.max_message_len);
        let total = parts.len();
        let mut first_error = None;

        // Every part is attempted; the first failure is returned at the end.
        for (index, part) in parts.iter().enumerate() {
            let request = SendMessageRequest {
                chat_id,
                text: part,
                reply_to_message_id: reply_to,
            };
            if let Err(e) = self.call("sendMessage", &request).await {
                warn!(
                    "Part {}/{} of message to chat {} failed: {}",
                    index + 1,
                    total,
                    chat_id,
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Sent message to chat {}", chat_id);
                Ok(())
            }
        }
    }

    #[instrument(skip(self, contents, caption), fields(size = contents.len()))]
    pub async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        contents: Vec<u8>,
        caption: &str,
    ) -> Result<(), ScribeError> {
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", Part::bytes(contents).file_name(file_name.to_string()));

        let request = self
            .http
            .post(self.method_url("sendDocument"))
            .timeout(self.upload_timeout)
            .multipart(form);
        self.send("sendDocument", request).await
    }

    pub async fn set_webhook(&self, url: &str) -> Result<(), ScribeError> {
        self.call("setWebhook", &SetWebhookRequest { url }).await
    }
}

/// Chunks of at most `max_len` characters.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_by_characters_not_bytes() {
        let text = "é".repeat(10);
        let parts = split_message(&text, 4);
        assert_eq!(parts, vec!["éééé", "éééé", "éé"]);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let text = "a".repeat(8192);
        let parts = split_message(&text, 4096);
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.len() == 4096));
        assert!(split_message("", 4096).is_empty());
    }

    #[test]
    fn token_is_part_of_method_url() {
        let config = TelegramConfig {
            bot_token: "123:abc".to_string(),
            api_base: "http://127.0.0.1:9/".to_string(),
            request_timeout_secs: 1,
            upload_timeout_secs: 1,
            max_message_len: 4096,
        };
        let client = TelegramClient::new(Client::new(), &config);
        assert_eq!(
            client.method_url("sendMessage"),
            "http://127.0.0.1:9/bot123:abc/sendMessage"
        );
    }
}
