use anyhow::Result;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone, PartialEq)]
pub enum TelegramCall {
    Json {
        method: String,
        body: Value,
    },
    Document {
        chat_id: String,
        caption: String,
        file_name: String,
        contents: Vec<u8>,
    },
}

#[derive(Default)]
struct TelegramState {
    calls: Mutex<Vec<(String, TelegramCall)>>,
    failures: Mutex<HashMap<String, u16>>,
    rejected_texts: Mutex<Vec<(String, u16)>>,
}

impl TelegramState {
    fn respond(&self, method: &str) -> (StatusCode, Json<Value>) {
        let status = self.failures.lock().unwrap().get(method).copied();
        self.reply(method, status)
    }

    fn respond_to_text(&self, method: &str, text: Option<&str>) -> (StatusCode, Json<Value>) {
        let rejected = text.and_then(|text| {
            self.rejected_texts
                .lock()
                .unwrap()
                .iter()
                .find(|(fragment, _)| text.contains(fragment.as_str()))
                .map(|(_, status)| *status)
        });
        match rejected {
            Some(status) => self.reply(method, Some(status)),
            None => self.respond(method),
        }
    }

    fn reply(&self, method: &str, status: Option<u16>) -> (StatusCode, Json<Value>) {
        match status {
            Some(status) => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST),
                Json(json!({"ok": false, "description": format!("{method} rejected")})),
            ),
            None => (StatusCode::OK, Json(json!({"ok": true, "result": {}}))),
        }
    }
}

/// Bot API stand-in that records every call it receives.
pub struct FakeTelegram {
    pub base_url: String,
    state: Arc<TelegramState>,
}

impl FakeTelegram {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(TelegramState::default());
        let app = Router::new()
            .route("/:bot/sendDocument", post(send_document))
            .route("/:bot/:method", post(json_method))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { base_url, state })
    }

    /// Makes `method` answer with `status` from now on.
    pub fn fail(&self, method: &str, status: u16) {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(method.to_string(), status);
    }

    /// Rejects any `sendMessage` whose text contains `fragment`.
    pub fn reject_text(&self, fragment: &str, status: u16) {
        self.state
            .rejected_texts
            .lock()
            .unwrap()
            .push((fragment.to_string(), status));
    }

    pub fn calls(&self) -> Vec<TelegramCall> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Path prefixes (`bot<token>`) the calls arrived on.
    pub fn bot_paths(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(bot, _)| bot.clone())
            .collect()
    }

    /// `text` of every `sendMessage`, in order.
    pub fn messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TelegramCall::Json { method, body } if method == "sendMessage" => {
                    body["text"].as_str().map(str::to_string)
                }
                _ => None,
            })
            .collect()
    }

    pub fn documents(&self) -> Vec<TelegramCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, TelegramCall::Document { .. }))
            .collect()
    }
}

async fn json_method(
    State(state): State<Arc<TelegramState>>,
    Path((bot, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let text = body["text"].as_str().map(str::to_string);
    state.calls.lock().unwrap().push((
        bot,
        TelegramCall::Json {
            method: method.clone(),
            body,
        },
    ));
    state.respond_to_text(&method, text.as_deref())
}

async fn send_document(
    State(state): State<Arc<TelegramState>>,
    Path(bot): Path<String>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut chat_id = String::new();
    let mut caption = String::new();
    let mut file_name = String::new();
    let mut contents = Vec::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "document" {
            file_name = field.file_name().unwrap_or_default().to_string();
            contents = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        } else {
            let value = field.text().await.unwrap_or_default();
            match name.as_str() {
                "chat_id" => chat_id = value,
                "caption" => caption = value,
                _ => {}
            }
        }
    }

    state.calls.lock().unwrap().push((
        bot,
        TelegramCall::Document {
            chat_id,
            caption,
            file_name,
            contents,
        },
    ));
    state.respond("sendDocument")
}
