use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::{Mutex, Notify};
use tokio::time::Duration;

pub const CLICKS_ALERT_HOOK: &str = "keywordinsight_send_clicks_alert_email";

/// One-shot work deferred off the request that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    SendClicksAlert { clicks: i64, threshold: i64 },
}

impl DeferredTask {
    pub fn hook(&self) -> &'static str {
        match self {
            Self::SendClicksAlert { .. } => CLICKS_ALERT_HOOK,
        }
    }

    /// Hook plus arguments; two tasks with the same id are the same event.
    pub fn task_id(&self) -> String {
        match self {
            Self::SendClicksAlert { clicks, threshold } => {
                format!("{}:{}:{}", self.hook(), clicks, threshold)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub task_id: String,
    pub task: DeferredTask,
    pub queued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
}

type ExecutorFuture = Pin<Box<dyn Future<Output = bool> + Send>>;
pub type Executor = Arc<dyn Fn(ScheduledTask) -> ExecutorFuture + Send + Sync>;

#[derive(Clone)]
pub struct Scheduler {
    queue: Arc<Mutex<Vec<ScheduledTask>>>,
    running: Arc<Mutex<usize>>,
    notify: Arc<Notify>,
    executor: Arc<RwLock<Option<Executor>>>,
    concurrency_limit: usize,
    max_queue_size: usize,
}

impl Scheduler {
    pub fn new(concurrency_limit: usize, max_queue_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(Mutex::new(0)),
            notify: Arc::new(Notify::new()),
            executor: Arc::new(RwLock::new(None)),
            concurrency_limit: concurrency_limit.max(1),
            max_queue_size,
        }
    }

    pub fn set_executor(&self, executor: Executor) -> AppResult<()> {
        let mut writer = self
            .executor
            .write()
            .map_err(|_| AppError::Internal("scheduler executor lock poisoned".to_string()))?;
        *writer = Some(executor);
        Ok(())
    }

    /// Queues `task` to run after `delay`. Returns `false` when an identical
    /// task is already waiting.
    pub async fn schedule_once(&self, task: DeferredTask, delay: Duration) -> AppResult<bool> {
        let now = Utc::now();
        let delay = chrono::Duration::from_std(delay)
            .map_err(|error| AppError::Internal(format!("invalid task delay: {}", error)))?;
        let scheduled = ScheduledTask {
            task_id: task.task_id(),
            task,
            queued_at: now,
            not_before: now + delay,
        };

        {
            let mut queue = self.queue.lock().await;
            if queue.iter().any(|queued| queued.task_id == scheduled.task_id) {
                return Ok(false);
            }
            if queue.len() >= self.max_queue_size {
                return Err(AppError::Internal(format!(
                    "Queue capacity exceeded (max {}).",
                    self.max_queue_size
                )));
            }
            tracing::debug!(task_id = %scheduled.task_id, not_before = %scheduled.not_before, "deferred task queued");
            queue.push(scheduled);
        }
        self.notify.notify_one();
        Ok(true)
    }

    pub async fn is_scheduled(&self, task_id: &str) -> bool {
        let queue = self.queue.lock().await;
        queue.iter().any(|queued| queued.task_id == task_id)
    }

    pub async fn pending(&self) -> Vec<ScheduledTask> {
        self.queue.lock().await.clone()
    }

    /// Drops every queued task for `hook`.
    pub async fn clear_hook(&self, hook: &str) -> usize {
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|queued| queued.task.hook() != hook);
        before - queue.len()
    }

    pub fn start(&self) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop().await;
        });
        self.notify.notify_one();
    }

    async fn run_loop(self) {
        loop {
            self.notify.notified().await;
            loop {
                let (maybe_task, next_delay) = self.pick_next_task().await;
                let Some(task) = maybe_task else {
                    if let Some(delay) = next_delay {
                        let notify = self.notify.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            notify.notify_one();
                        });
                    }
                    break;
                };

                if !self.try_reserve_slot().await {
                    let mut queue = self.queue.lock().await;
                    queue.push(task);
                    break;
                }

                let scheduler = self.clone();
                tokio::spawn(async move {
                    let task_id = task.task_id.clone();
                    let succeeded = scheduler.execute(task).await;
                    scheduler.release_slot().await;
                    if !succeeded {
                        tracing::warn!(task_id = %task_id, "deferred task finished in failed state");
                    }
                    scheduler.notify.notify_one();
                });
            }
        }
    }

    async fn execute(&self, task: ScheduledTask) -> bool {
        let executor = match self.executor.read() {
            Ok(reader) => reader.clone(),
            Err(_) => None,
        };
        match executor {
            Some(executor) => executor(task).await,
            None => false,
        }
    }

    async fn pick_next_task(&self) -> (Option<ScheduledTask>, Option<Duration>) {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return (None, None);
        }

        let now = Utc::now();
        let ready_index = queue
            .iter()
            .enumerate()
            .filter(|(_, task)| task.not_before <= now)
            .min_by_key(|(_, task)| task.not_before)
            .map(|(index, _)| index);

        match ready_index {
            Some(index) => (Some(queue.remove(index)), None),
            None => {
                let delay = queue.iter().map(|task| task.not_before).min().map(|at| {
                    let diff = at.signed_duration_since(now).num_milliseconds();
                    Duration::from_millis(diff.max(0) as u64)
                });
                (None, delay)
            }
        }
    }

    async fn try_reserve_slot(&self) -> bool {
        let mut running = self.running.lock().await;
        if *running >= self.concurrency_limit {
            return false;
        }
        *running += 1;
        true
    }

    async fn release_slot(&self) {
        let mut running = self.running.lock().await;
        if *running > 0 {
            *running -= 1;
        }
    }
}
