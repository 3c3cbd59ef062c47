//! Task queue and worker pool for asynchronous generation work.
//!
//! The asynchronous boundary is a first-class interface: the request path
//! submits a payload and gets an opaque task id back immediately; a separate
//! pool of workers drains the queue. Dispatch never blocks the request path,
//! a full or closed queue fails fast. Each payload enters the channel once
//! and is consumed by exactly one worker, which is what keeps task execution
//! at-most-once (replaying a payload would append a duplicate assistant
//! message).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{ChatroomId, MessageId};

/// Opaque identifier handed back to the request path on dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the worker needs; the triggering user message travels in the
/// payload so execution never depends on read-after-write visibility.
#[derive(Debug, Clone)]
pub struct TaskPayload {
    pub chatroom_id: ChatroomId,
    pub user_message_id: MessageId,
    pub user_message_text: String,
}

#[derive(Debug)]
pub struct QueuedTask {
    pub id: TaskId,
    pub payload: TaskPayload,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is full or its workers are gone. The request path surfaces
    /// this immediately rather than waiting.
    #[error("Task queue is unavailable")]
    Unavailable,
}

/// Submit half of the queue, held by the request path.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<QueuedTask>,
}

impl TaskQueue {
    /// Creates a bounded queue; hand the receiver to [`spawn_workers`].
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Non-blocking enqueue; returns the opaque task id synchronously.
    pub fn dispatch(&self, payload: TaskPayload) -> Result<TaskId, QueueError> {
        let id = TaskId::generate();
        let task = QueuedTask {
            id: id.clone(),
            payload,
        };

        self.tx.try_send(task).map_err(|e| {
            debug!(task_id = %id, error = %e, "Task dispatch rejected");
            QueueError::Unavailable
        })?;

        Ok(id)
    }
}

/// Consumer side of the queue. Implemented by the generation pipeline;
/// handlers must swallow their own errors, a task failure is terminal for
/// the task but never for the worker.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: QueuedTask);
}

/// Starts `count` workers sharing one receiver. Workers exit when the
/// submit half is dropped and the channel drains.
pub fn spawn_workers(
    count: usize,
    rx: mpsc::Receiver<QueuedTask>,
    handler: Arc<dyn TaskHandler>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));

    (0..count)
        .map(|worker| {
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                loop {
                    // Lock only for the recv so siblings can pick up work
                    // while this task is being handled.
                    let task = { rx.lock().await.recv().await };

                    match task {
                        Some(task) => handler.handle(task).await,
                        None => {
                            info!(worker, "Task queue closed, worker stopping");
                            break;
                        }
                    }
                }
            })
        })
        .collect()
}
