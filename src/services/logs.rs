use crate::db::Store;
use crate::domain::events::NotificationEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::error;

/// Event-bus listener that persists significant events as system log rows.
/// High-frequency lifecycle chatter (queued, started, clean completions) is
/// deliberately not persisted.
pub struct LogService {
    store: Store,
    event_bus: broadcast::Sender<NotificationEvent>,
}

impl LogService {
    #[must_use]
    pub const fn new(store: Store, event_bus: broadcast::Sender<NotificationEvent>) -> Self {
        Self { store, event_bus }
    }

    pub fn start_listener(self: Arc<Self>) {
        let mut rx = self.event_bus.subscribe();
        let service = self;

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = service.handle_event(event).await {
                            error!(error = %e, "Failed to save log");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        error!(count, "Log listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Log listener event bus closed");
                        break;
                    }
                }
            }
        });
    }

    async fn handle_event(&self, event: NotificationEvent) -> anyhow::Result<()> {
        let (event_type, level, message, details) = match &event {
            NotificationEvent::TaskCompleted {
                task_id, degraded, ..
            } => {
                if *degraded {
                    (
                        "TaskDegraded".to_string(),
                        "warn",
                        format!("Task {task_id} completed with the fallback reply"),
                        Some(serde_json::to_string(&event)?),
                    )
                } else {
                    return Ok(());
                }
            }
            NotificationEvent::TaskFailed {
                task_id, reason, ..
            } => (
                "TaskFailed".to_string(),
                "error",
                format!("Task {task_id} failed: {reason}"),
                Some(serde_json::to_string(&event)?),
            ),
            NotificationEvent::SweepFinished { removed } => {
                if *removed > 0 {
                    (
                        "SweepFinished".to_string(),
                        "info",
                        format!("Removed {removed} expired verification codes"),
                        None,
                    )
                } else {
                    return Ok(());
                }
            }
            NotificationEvent::Error { message } => {
                ("Error".to_string(), "error", message.clone(), None)
            }
            NotificationEvent::Info { message } => {
                ("Info".to_string(), "info", message.clone(), None)
            }

            NotificationEvent::TaskQueued { .. } | NotificationEvent::TaskStarted { .. } => {
                return Ok(());
            }
        };

        self.store
            .add_system_log(&event_type, level, &message, details)
            .await?;

        Ok(())
    }
}
