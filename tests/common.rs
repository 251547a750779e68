#![allow(dead_code)]

use scribe_api::{serve, AppState};
use scribe_bot::TranscriptionService;
use scribe_metrics::MetricsService;
use scribe_models::Config;
use scribe_testsupport::*;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// The webhook server running in-process against fake upstreams.
pub struct TestServer {
    pub base_url: String,
    pub telegram: FakeTelegram,
    pub transkriptor: FakeTranskriptor,
    pub service: Arc<TranscriptionService>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook/{}", self.base_url, TEST_BOT_TOKEN)
    }

    /// Triggers graceful shutdown and waits for the server task.
    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await??;
        Ok(())
    }
}

pub async fn spawn_server(tweak: impl FnOnce(&mut Config)) -> anyhow::Result<TestServer> {
    let telegram = FakeTelegram::start().await?;
    let transkriptor = FakeTranskriptor::start().await?;
    let mut config = test_config(&telegram, &transkriptor);
    tweak(&mut config);

    let metrics = Arc::new(MetricsService::new()?);
    let service = Arc::new(TranscriptionService::from_config(&config, metrics.clone())?);
    let state = AppState::new(&config.telegram.bot_token, service.clone(), metrics);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve(listener, state, async move {
        let _ = stopped.await;
    }));

    Ok(TestServer {
        base_url,
        telegram,
        transkriptor,
        service,
        stop: Some(stop),
        handle,
    })
}
