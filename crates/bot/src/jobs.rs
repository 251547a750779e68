use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Job {
    pub chat_id: i64,
    pub started_at: Instant,
    pub attempts: u32,
    abort: AbortHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub order_id: String,
    pub chat_id: i64,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Background pollers keyed by order id. A job removes itself when its
/// task finishes.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` for `order_id` unless one is already tracked. Returns
    /// whether a task was spawned.
    pub fn spawn<F>(&self, order_id: &str, chat_id: i64, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.jobs.entry(order_id.to_string()) {
            Entry::Occupied(_) => {
                debug!("Poller for {} already running", order_id);
                false
            }
            Entry::Vacant(slot) => {
                let jobs = self.jobs.clone();
                let key = order_id.to_string();
                let handle = tokio::spawn(async move {
                    task.await;
                    jobs.remove(&key);
                });
                slot.insert(Job {
                    chat_id,
                    started_at: Instant::now(),
                    attempts: 0,
                    abort: handle.abort_handle(),
                });
                true
            }
        }
    }

    pub fn record_attempt(&self, order_id: &str) -> u32 {
        match self.jobs.get_mut(order_id) {
            Some(mut job) => {
                job.attempts += 1;
                job.attempts
            }
            None => 0,
        }
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.jobs.contains_key(order_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self
            .jobs
            .iter()
            .map(|entry| JobSnapshot {
                order_id: entry.key().clone(),
                chat_id: entry.chat_id,
                attempts: entry.attempts,
                elapsed: entry.started_at.elapsed(),
            })
            .collect();
        jobs.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        jobs
    }

    /// Aborts every outstanding poller.
    pub fn abort_all(&self) -> usize {
        let keys: Vec<String> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        let mut aborted = 0;
        for key in keys {
            if let Some((_, job)) = self.jobs.remove(&key) {
                job.abort.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            info!("Aborted {} transcription pollers", aborted);
        }
        aborted
    }
}
