use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::task::{Task, TaskStatus};
use crate::error::{PipelineError, Result};

/// Reaper schedule and retention for terminal tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEngineConfig {
    /// How often the reaper runs
    pub reaper_interval: Duration,
    /// How long a terminal task stays queryable
    pub retention: Duration,
}

impl Default for TaskEngineConfig {
    fn default() -> Self {
        Self {
            reaper_interval: Duration::from_secs(300),
            retention: Duration::from_secs(300),
        }
    }
}

impl TaskEngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reaper_interval.is_zero() {
            return Err(PipelineError::Configuration(
                "reaper_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tracked tasks by id. Reaped ids are forgotten.
type TaskStore = HashMap<String, Task>;

/// In-memory registry and runner for background work
#[derive(Clone)]
pub struct TaskEngine {
    config: TaskEngineConfig,
    store: Arc<RwLock<TaskStore>>,
}

impl TaskEngine {
    pub fn new(config: TaskEngineConfig) -> Self {
        Self {
            config,
            store: Arc::new(RwLock::new(TaskStore::new())),
        }
    }

    pub fn config(&self) -> &TaskEngineConfig {
        &self.config
    }

    /// Register `work` under a fresh id and start it in the background
    pub async fn submit<F>(&self, work: F) -> String
    where
        F: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        loop {
            let id = Uuid::new_v4().to_string();
            if self.register(&id).await.is_ok() {
                self.spawn(id.clone(), work);
                return id;
            }
        }
    }

    /// Register `work` under a caller-chosen id.
    ///
    /// Fails with `DuplicateTask` while a task with that id is still
    /// tracked. Once reaped, the id may be used again.
    pub async fn submit_with_id<F>(&self, id: impl Into<String>, work: F) -> Result<String>
    where
        F: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let id = id.into();
        self.register(&id).await?;
        self.spawn(id.clone(), work);
        Ok(id)
    }

    /// Snapshot of a task; `None` for unknown or reaped ids
    pub async fn status(&self, id: &str) -> Option<Task> {
        self.store.read().await.get(id).cloned()
    }

    /// All tracked tasks, oldest first
    pub async fn list(&self) -> Vec<Task> {
        let store = self.store.read().await;
        let mut tasks: Vec<Task> = store.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    /// Number of tracked tasks in `status`
    pub async fn count(&self, status: TaskStatus) -> usize {
        self.store
            .read()
            .await
            .values()
            .filter(|task| task.status == status)
            .count()
    }

    /// Remove terminal tasks whose `completed_at` predates `now - max_age`
    pub async fn reap(&self, max_age: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            None => return 0,
        };

        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, task| !task.finished_before(cutoff));
        let removed = before - store.len();

        if removed > 0 {
            info!("Reaped {} finished tasks", removed);
        }
        removed
    }

    /// Poll until the task is terminal or gone
    pub async fn wait(&self, id: &str, poll_interval: Duration) -> Option<Task> {
        loop {
            match self.status(id).await {
                Some(task) if task.is_done() => return Some(task),
                Some(_) => tokio::time::sleep(poll_interval).await,
                None => return None,
            }
        }
    }

    /// Periodically reap terminal tasks older than the configured retention
    pub fn start_reaper(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let period = self.config.reaper_interval;
        let retention = self.config.retention;

        info!(
            "Starting task reaper (interval: {:?}, retention: {:?})",
            period, retention
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                engine.reap(retention).await;
            }
        })
    }

    async fn register(&self, id: &str) -> Result<()> {
        let mut store = self.store.write().await;
        if store.contains_key(id) {
            return Err(PipelineError::DuplicateTask(id.to_string()));
        }
        store.insert(id.to_string(), Task::new(id));
        debug!("Registered task {}", id);
        Ok(())
    }

    fn spawn<F>(&self, id: String, work: F)
    where
        F: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            update(&store, &id, |task| task.start()).await;
            debug!("Task {} running", id);

            // A separate task so a panicking unit is observed as a JoinError
            match tokio::spawn(work).await {
                Ok(Ok(value)) => {
                    update(&store, &id, |task| task.complete(value)).await;
                    info!("Task {} completed", id);
                }
                Ok(Err(e)) => {
                    let reason = format!("{:#}", e);
                    warn!("Task {} failed: {}", id, reason);
                    update(&store, &id, |task| task.fail(reason)).await;
                }
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "task was cancelled".to_string()
                    };
                    warn!("Task {} failed: {}", id, reason);
                    update(&store, &id, |task| task.fail(reason)).await;
                }
            }
        });
    }
}

async fn update(store: &RwLock<TaskStore>, id: &str, apply: impl FnOnce(&mut Task) -> bool) {
    if let Some(task) = store.write().await.get_mut(id) {
        apply(task);
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("task panicked: {}", detail)
}
