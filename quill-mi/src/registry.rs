//! Upload task registry
//!
//! Holds the live state of every upload task. Explicitly constructed and
//! dependency-injected (never ambient global state), with a defined
//! `start()`/`stop()` lifecycle. A single mutex guards the task map so
//! concurrent pipelines never race on an entry; the worker processing a
//! task is its only mutator while non-terminal, readers only read.
//!
//! Every mutating call also publishes on the task's event channel, and a
//! sweeper evicts terminal tasks that have gone unobserved for the
//! retention window so abandoned entries cannot grow without bound.

use crate::events::TaskEvent;
use crate::models::{TaskStatus, UploadResult, UploadTask};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry tuning knobs
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a terminal, unobserved task survives before eviction
    pub retention: Duration,
    /// Sweeper wake-up interval
    pub sweep_interval: Duration,
    /// Per-task broadcast channel capacity
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            event_capacity: 64,
        }
    }
}

/// Errors from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("task not found")]
    NotFound,

    /// The task is already in the named terminal state
    #[error("task already terminal: {0:?}")]
    AlreadyTerminal(TaskStatus),

    #[error("task is not processing")]
    NotProcessing,

    #[error("progress must not decrease (current {current}, requested {requested})")]
    ProgressDecreased { current: u8, requested: u8 },
}

/// One live entry: the task plus its event channel and cancellation token
struct TaskEntry {
    task: UploadTask,
    events: broadcast::Sender<TaskEvent>,
    cancel: CancellationToken,
    last_observed: Instant,
}

impl TaskEntry {
    fn publish(&self, event: TaskEvent) {
        // A send error only means no receivers are currently subscribed.
        let _ = self.events.send(event);
    }
}

/// Live state of every upload task
pub struct TaskRegistry {
    tasks: Mutex<HashMap<Uuid, TaskEntry>>,
    config: RegistryConfig,
    shutdown: CancellationToken,
}

impl TaskRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the eviction sweeper. Call once at service startup.
    pub fn start(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Task registry sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = registry.evict_terminal().await;
                        if evicted > 0 {
                            info!(evicted, "Evicted terminal upload tasks");
                        }
                    }
                }
            }
        });
    }

    /// Stop the eviction sweeper
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Insert a new task in `Queued` state and return its snapshot
    pub async fn create(&self, user_id: Uuid, filename: String, file_size: u64) -> UploadTask {
        let task = UploadTask::new(user_id, filename, file_size);
        let (events, _) = broadcast::channel(self.config.event_capacity);
        let entry = TaskEntry {
            task: task.clone(),
            events,
            cancel: CancellationToken::new(),
            last_observed: Instant::now(),
        };

        let mut tasks = self.tasks.lock().await;
        tasks.insert(task.id, entry);
        debug!(task_id = %task.id, user_id = %task.user_id, "Upload task created");
        task
    }

    /// Point-in-time snapshot; refreshes the observation timestamp
    pub async fn snapshot(&self, task_id: Uuid) -> Option<UploadTask> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id)?;
        entry.last_observed = Instant::now();
        Some(entry.task.clone())
    }

    /// The task's cancellation token, checked by the worker at checkpoints
    pub async fn cancel_token(&self, task_id: Uuid) -> Option<CancellationToken> {
        let tasks = self.tasks.lock().await;
        tasks.get(&task_id).map(|e| e.cancel.clone())
    }

    /// Worker pickup: `Queued` -> `Processing`
    pub async fn begin(&self, task_id: Uuid) -> Result<(), RegistryError> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id).ok_or(RegistryError::NotFound)?;
        if entry.task.status.is_terminal() {
            return Err(RegistryError::AlreadyTerminal(entry.task.status));
        }
        entry.task.status = TaskStatus::Processing;
        entry.publish(TaskEvent::Status {
            task: entry.task.clone(),
        });
        Ok(())
    }

    /// Progress checkpoint; legal only while `Processing`, never decreasing
    pub async fn update_progress(
        &self,
        task_id: Uuid,
        progress: u8,
        stage: &str,
    ) -> Result<(), RegistryError> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id).ok_or(RegistryError::NotFound)?;
        if entry.task.status != TaskStatus::Processing {
            return Err(RegistryError::NotProcessing);
        }
        if progress < entry.task.progress {
            return Err(RegistryError::ProgressDecreased {
                current: entry.task.progress,
                requested: progress,
            });
        }
        entry.task.progress = progress.min(100);
        entry.task.stage = Some(stage.to_string());
        entry.publish(TaskEvent::Progress {
            task_id,
            progress: entry.task.progress,
            stage: stage.to_string(),
        });
        Ok(())
    }

    /// Terminal transition: `Completed`
    pub async fn complete(
        &self,
        task_id: Uuid,
        result: UploadResult,
    ) -> Result<UploadTask, RegistryError> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id).ok_or(RegistryError::NotFound)?;
        if entry.task.status.is_terminal() {
            return Err(RegistryError::AlreadyTerminal(entry.task.status));
        }
        entry.task.status = TaskStatus::Completed;
        entry.task.progress = 100;
        entry.task.stage = None;
        entry.task.ended_at = Some(chrono::Utc::now());
        entry.task.result = Some(result.clone());
        entry.publish(TaskEvent::Completed { task_id, result });
        info!(task_id = %task_id, "Upload task completed");
        Ok(entry.task.clone())
    }

    /// Terminal transition: `Failed`
    pub async fn fail(&self, task_id: Uuid, error: String) -> Result<UploadTask, RegistryError> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id).ok_or(RegistryError::NotFound)?;
        if entry.task.status.is_terminal() {
            return Err(RegistryError::AlreadyTerminal(entry.task.status));
        }
        entry.task.status = TaskStatus::Failed;
        entry.task.stage = None;
        entry.task.ended_at = Some(chrono::Utc::now());
        entry.task.error = Some(error.clone());
        entry.publish(TaskEvent::Failed { task_id, error });
        warn!(task_id = %task_id, "Upload task failed");
        Ok(entry.task.clone())
    }

    /// Terminal transition: `Cancelled`
    pub async fn cancel(&self, task_id: Uuid) -> Result<UploadTask, RegistryError> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id).ok_or(RegistryError::NotFound)?;
        if entry.task.status.is_terminal() {
            return Err(RegistryError::AlreadyTerminal(entry.task.status));
        }
        entry.task.status = TaskStatus::Cancelled;
        entry.task.stage = None;
        entry.task.ended_at = Some(chrono::Utc::now());
        entry.publish(TaskEvent::Status {
            task: entry.task.clone(),
        });
        info!(task_id = %task_id, "Upload task cancelled");
        Ok(entry.task.clone())
    }

    /// Request cooperative cancellation.
    ///
    /// Queued tasks transition immediately (the worker sees the terminal
    /// state at pickup and stops). Processing tasks have their token
    /// cancelled; the worker honors it at the next checkpoint. Requesting
    /// cancellation of an already-cancelled task is idempotent; completed
    /// or failed tasks report their terminal status as an error.
    pub async fn request_cancel(&self, task_id: Uuid) -> Result<TaskStatus, RegistryError> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id).ok_or(RegistryError::NotFound)?;
        match entry.task.status {
            TaskStatus::Queued => {
                entry.cancel.cancel();
                entry.task.status = TaskStatus::Cancelled;
                entry.task.ended_at = Some(chrono::Utc::now());
                entry.publish(TaskEvent::Status {
                    task: entry.task.clone(),
                });
                info!(task_id = %task_id, "Queued upload task cancelled before pickup");
                Ok(TaskStatus::Cancelled)
            }
            TaskStatus::Processing => {
                entry.cancel.cancel();
                debug!(task_id = %task_id, "Cancellation requested; honored at next checkpoint");
                Ok(TaskStatus::Cancelled)
            }
            TaskStatus::Cancelled => Ok(TaskStatus::Cancelled),
            status @ (TaskStatus::Completed | TaskStatus::Failed) => {
                Err(RegistryError::AlreadyTerminal(status))
            }
        }
    }

    /// Subscribe to a task's events.
    ///
    /// The snapshot and receiver are taken under the same lock, so no
    /// event falls between them: the caller sees the snapshot, then every
    /// later event in order.
    pub async fn subscribe(
        &self,
        task_id: Uuid,
    ) -> Result<(UploadTask, broadcast::Receiver<TaskEvent>), RegistryError> {
        let mut tasks = self.tasks.lock().await;
        let entry = tasks.get_mut(&task_id).ok_or(RegistryError::NotFound)?;
        entry.last_observed = Instant::now();
        Ok((entry.task.clone(), entry.events.subscribe()))
    }

    /// Remove terminal tasks unobserved for the retention window
    pub async fn evict_terminal(&self) -> usize {
        let retention = self.config.retention;
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, entry| {
            !(entry.task.status.is_terminal() && entry.last_observed.elapsed() >= retention)
        });
        before - tasks.len()
    }

    /// Number of live tasks (diagnostics)
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
