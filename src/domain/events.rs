//! Domain events for the application.
//!
//! These events are sent via the broadcast event bus to notify SSE clients
//! and the log listener of system state changes. Delivery is best-effort:
//! task state reported here is non-authoritative and may be lost, the
//! durable record of a task's outcome is the assistant message row.

use serde::Serialize;

/// Events sent to connected clients via SSE (Server-Sent Events).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum NotificationEvent {
    TaskQueued {
        task_id: String,
        chatroom_id: i32,
    },
    TaskStarted {
        task_id: String,
        chatroom_id: i32,
    },
    TaskCompleted {
        task_id: String,
        chatroom_id: i32,
        /// True when the upstream generation call failed and the configured
        /// fallback reply was persisted instead.
        degraded: bool,
    },
    TaskFailed {
        task_id: String,
        chatroom_id: i32,
        reason: String,
    },

    SweepFinished {
        removed: u64,
    },

    Error {
        message: String,
    },
    Info {
        message: String,
    },
}
