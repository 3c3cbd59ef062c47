//! Generation pipeline: the worker-side handler for queued chat tasks.
//!
//! Each task produces at most one assistant message. Failures split two
//! ways: an upstream generation failure degrades the task (the configured
//! fallback reply is persisted so the user turn is never silently dropped),
//! while a store failure or a deleted chatroom fails the task outright and
//! persists nothing. A failed task never takes the worker down.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::cache::ChatroomCache;
use crate::clients::GenerationClient;
use crate::db::Store;
use crate::domain::MessageRole;
use crate::domain::events::NotificationEvent;
use crate::queue::{QueuedTask, TaskHandler};
use crate::services::context::ContextAssembler;

pub struct GenerationPipeline {
    store: Store,
    client: Arc<dyn GenerationClient>,
    context: ContextAssembler,
    cache: ChatroomCache,
    fallback_reply: String,
    event_bus: broadcast::Sender<NotificationEvent>,
}

impl GenerationPipeline {
    #[must_use]
    pub fn new(
        store: Store,
        client: Arc<dyn GenerationClient>,
        context: ContextAssembler,
        cache: ChatroomCache,
        fallback_reply: String,
        event_bus: broadcast::Sender<NotificationEvent>,
    ) -> Self {
        Self {
            store,
            client,
            context,
            cache,
            fallback_reply,
            event_bus,
        }
    }

    fn emit(&self, event: NotificationEvent) {
        // Nobody listening is fine.
        let _ = self.event_bus.send(event);
    }

    fn fail(&self, task: &QueuedTask, reason: &str) {
        error!(task_id = %task.id, chatroom_id = %task.payload.chatroom_id, reason, "Generation task failed");
        metrics::counter!("generation_tasks_failed_total").increment(1);
        self.emit(NotificationEvent::TaskFailed {
            task_id: task.id.to_string(),
            chatroom_id: task.payload.chatroom_id.value(),
            reason: reason.to_string(),
        });
    }

    async fn run(&self, task: &QueuedTask) -> Result<bool, String> {
        let chatroom_id = task.payload.chatroom_id;

        // The chatroom may have been deleted between dispatch and pickup.
        let chatroom = self
            .store
            .get_chatroom(chatroom_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Chatroom {chatroom_id} no longer exists"))?;

        let history = self
            .context
            .assemble(
                chatroom_id,
                task.payload.user_message_id,
                &task.payload.user_message_text,
            )
            .await
            .map_err(|e| e.to_string())?;

        let (reply, degraded) = match self.client.generate(&history).await {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Generation call failed, using fallback reply");
                (self.fallback_reply.clone(), true)
            }
        };

        self.store
            .append_message(
                chatroom_id,
                MessageRole::Assistant,
                &reply,
                Some(task.id.as_str()),
            )
            .await
            .map_err(|e| e.to_string())?;

        // The reply changed the owner's aggregate message counts.
        self.cache
            .invalidate(crate::domain::UserId::new(chatroom.user_id))
            .await;

        Ok(degraded)
    }
}

#[async_trait]
impl TaskHandler for GenerationPipeline {
    async fn handle(&self, task: QueuedTask) {
        info!(task_id = %task.id, chatroom_id = %task.payload.chatroom_id, "Generation task started");
        self.emit(NotificationEvent::TaskStarted {
            task_id: task.id.to_string(),
            chatroom_id: task.payload.chatroom_id.value(),
        });

        match self.run(&task).await {
            Ok(degraded) => {
                metrics::counter!("generation_tasks_completed_total").increment(1);
                self.emit(NotificationEvent::TaskCompleted {
                    task_id: task.id.to_string(),
                    chatroom_id: task.payload.chatroom_id.value(),
                    degraded,
                });
            }
            Err(reason) => self.fail(&task, &reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ChatTurn, GenerationError};
    use crate::domain::{ChatroomId, MessageId, UserId};
    use crate::queue::{TaskPayload, TaskQueue};
    use std::time::Duration;

    struct Scripted {
        outcome: Result<String, ()>,
    }

    #[async_trait]
    impl GenerationClient for Scripted {
        async fn generate(&self, _history: &[ChatTurn]) -> Result<String, GenerationError> {
            self.outcome
                .clone()
                .map_err(|()| GenerationError::Request("scripted failure".to_string()))
        }
    }

    struct Fixture {
        store: Store,
        cache: ChatroomCache,
        user_id: UserId,
        room: ChatroomId,
        trigger: MessageId,
        events: broadcast::Receiver<NotificationEvent>,
        pipeline: GenerationPipeline,
    }

    async fn fixture(outcome: Result<String, ()>) -> Fixture {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        let user = store.create_user("+15550003333", None).await.unwrap();
        let room_model = store.create_chatroom(user.id, "pipe", None).await.unwrap();
        let room = ChatroomId::new(room_model.id);
        let trigger_model = store
            .append_message(room, MessageRole::User, "hello there", None)
            .await
            .unwrap();

        let cache = ChatroomCache::new(Duration::from_secs(600));
        let (event_bus, events) = broadcast::channel(16);

        let pipeline = GenerationPipeline::new(
            store.clone(),
            Arc::new(Scripted { outcome }),
            ContextAssembler::new(store.clone(), 10),
            cache.clone(),
            "fallback apology".to_string(),
            event_bus,
        );

        Fixture {
            store,
            cache,
            user_id: user.id,
            room,
            trigger: MessageId::new(trigger_model.id),
            events,
            pipeline,
        }
    }

    fn task(room: ChatroomId, trigger: MessageId) -> QueuedTask {
        let (queue, mut rx) = TaskQueue::new(1);
        queue
            .dispatch(TaskPayload {
                chatroom_id: room,
                user_message_id: trigger,
                user_message_text: "hello there".to_string(),
            })
            .unwrap();
        rx.try_recv().unwrap()
    }

    #[tokio::test]
    async fn successful_task_appends_one_assistant_message() {
        let mut fx = fixture(Ok("hi!".to_string())).await;

        fx.pipeline.handle(task(fx.room, fx.trigger)).await;

        let messages = fx.store.list_messages(fx.room).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "hi!");
        assert!(messages[1].task_id.is_some());

        // started, then completed non-degraded
        let _ = fx.events.recv().await.unwrap();
        match fx.events.recv().await.unwrap() {
            NotificationEvent::TaskCompleted { degraded, .. } => assert!(!degraded),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upstream_failure_persists_the_fallback_reply() {
        let mut fx = fixture(Err(())).await;

        fx.pipeline.handle(task(fx.room, fx.trigger)).await;

        let messages = fx.store.list_messages(fx.room).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "fallback apology");

        let _ = fx.events.recv().await.unwrap();
        match fx.events.recv().await.unwrap() {
            NotificationEvent::TaskCompleted { degraded, .. } => assert!(degraded),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn deleted_chatroom_fails_the_task_without_persisting() {
        let fx = fixture(Ok("hi!".to_string())).await;
        let mut events = fx.events;

        fx.store.remove_chatroom(fx.room, fx.user_id).await.unwrap();
        fx.pipeline.handle(task(fx.room, fx.trigger)).await;

        let _ = events.recv().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            NotificationEvent::TaskFailed { .. }
        ));
    }

    #[tokio::test]
    async fn completion_invalidates_the_owners_cached_list() {
        let fx = fixture(Ok("hi!".to_string())).await;

        let stale = fx.store.list_chatroom_summaries(fx.user_id).await.unwrap();
        fx.cache.populate(fx.user_id, &stale).await;

        fx.pipeline.handle(task(fx.room, fx.trigger)).await;

        assert!(fx.cache.read(fx.user_id).await.is_none());
    }
}
