use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Work invoked on every tick of a recurring task.
///
/// The token is cancelled once the invocation outlives the task's timeout;
/// the work is expected to stop at its next checkpoint and is always
/// awaited to completion.
pub type TaskFn =
    Arc<dyn Fn(CancellationToken) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A recurring registration.
#[derive(Clone)]
pub struct ScheduledTask {
    /// Globally unique, e.g. `collection-discovery:<source id>:run`.
    pub id: String,
    pub frequency: Duration,
    pub timeout: Duration,
    pub initial_delay: Option<Duration>,
    pub run: TaskFn,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("frequency", &self.frequency)
            .field("timeout", &self.timeout)
            .field("initial_delay", &self.initial_delay)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("task '{0}' is already scheduled")]
    Duplicate(String),

    #[error("invalid schedule for task '{id}': {reason}")]
    Invalid { id: String, reason: String },

    #[error("scheduler has been shut down")]
    ShutDown,
}

/// Registers recurring work with whatever drives time in the host process.
pub trait Scheduler: Send + Sync {
    fn schedule_recurring(&self, task: ScheduledTask) -> Result<(), SchedulerError>;
}

/// Runs each registered task on its own tokio task.
///
/// Must be used from within a tokio runtime.
pub struct TokioScheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl TokioScheduler {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn task_ids(&self) -> Vec<String> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop ticking and wait for in-flight invocations to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain().map(|(_, handle)| handle).collect()
        };

        for handle in handles {
            if let Err(error) = handle.await {
                warn!(%error, "scheduled task ended abnormally");
            }
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_recurring(&self, task: ScheduledTask) -> Result<(), SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        if task.frequency.is_zero() {
            return Err(SchedulerError::Invalid {
                id: task.id,
                reason: "frequency must be greater than zero".into(),
            });
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.contains_key(&task.id) {
            return Err(SchedulerError::Duplicate(task.id));
        }

        let id = task.id.clone();
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Some(delay) = task.initial_delay {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let mut interval = tokio::time::interval(task.frequency);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                debug!(task = %task.id, "running scheduled task");
                let stop = token.child_token();
                let mut invocation = (task.run)(stop.clone());

                tokio::select! {
                    _ = &mut invocation => continue,
                    _ = tokio::time::sleep(task.timeout) => {}
                }

                warn!(
                    task = %task.id,
                    timeout = ?task.timeout,
                    "scheduled task exceeded its timeout; asking it to stop"
                );
                stop.cancel();
                invocation.await;
            }
        });

        tasks.insert(id, handle);
        Ok(())
    }
}
