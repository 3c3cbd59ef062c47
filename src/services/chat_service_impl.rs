//! `SeaORM` implementation of the `ChatService` trait.
//!
//! Owns the send-message acceptance sequence and its compensations: quota
//! is reserved before the insert, and both the insert and the dispatch are
//! unwound if a later step fails, so a rejected send spends nothing.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use crate::cache::ChatroomCache;
use crate::db::{ChatroomSummary, Store, User};
use crate::domain::events::NotificationEvent;
use crate::domain::{ChatroomId, MessageId, MessageRole};
use crate::queue::{TaskPayload, TaskQueue};
use crate::services::chat_service::{
    ChatError, ChatService, ChatroomDetail, MessageView, SendOutcome,
};
use crate::services::quota::{QuotaError, QuotaTracker};

const MAX_TITLE_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 4000;

pub struct SeaOrmChatService {
    store: Store,
    cache: ChatroomCache,
    quota: QuotaTracker,
    queue: TaskQueue,
    event_bus: broadcast::Sender<NotificationEvent>,
}

impl SeaOrmChatService {
    #[must_use]
    pub const fn new(
        store: Store,
        cache: ChatroomCache,
        quota: QuotaTracker,
        queue: TaskQueue,
        event_bus: broadcast::Sender<NotificationEvent>,
    ) -> Self {
        Self {
            store,
            cache,
            quota,
            queue,
            event_bus,
        }
    }

    async fn release_quota_or_warn(&self, user: &User) {
        if let Err(e) = self.quota.release(user.id).await {
            warn!(user_id = %user.id, error = %e, "Failed to release reserved quota");
        }
    }

    async fn remove_message_or_warn(&self, id: MessageId) {
        if let Err(e) = self.store.remove_message(id).await {
            warn!(message_id = %id, error = %e, "Failed to remove orphaned message");
        }
    }
}

#[async_trait]
impl ChatService for SeaOrmChatService {
    async fn create_chatroom(
        &self,
        user: &User,
        title: &str,
        description: Option<&str>,
    ) -> Result<ChatroomSummary, ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("Title must not be empty".to_string()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(ChatError::Validation(format!(
                "Title must be at most {MAX_TITLE_LEN} characters"
            )));
        }

        let model = self.store.create_chatroom(user.id, title, description).await?;

        self.cache.invalidate(user.id).await;

        Ok(ChatroomSummary {
            id: model.id,
            title: model.title,
            description: model.description,
            created_at: model.created_at,
            updated_at: model.updated_at,
            message_count: 0,
        })
    }

    async fn list_chatrooms(&self, user: &User) -> Result<Vec<ChatroomSummary>, ChatError> {
        if let Some(list) = self.cache.read(user.id).await {
            return Ok(list);
        }

        let list = self.store.list_chatroom_summaries(user.id).await?;
        self.cache.populate(user.id, &list).await;

        Ok(list)
    }

    async fn get_chatroom(&self, user: &User, id: ChatroomId) -> Result<ChatroomDetail, ChatError> {
        let room = self
            .store
            .get_owned_chatroom(id, user.id)
            .await?
            .ok_or(ChatError::ChatroomNotFound)?;

        let messages = self
            .store
            .list_messages(id)
            .await?
            .into_iter()
            .map(|m| MessageView {
                id: m.id,
                content: m.content,
                role: m.role,
                task_id: m.task_id,
                created_at: m.created_at,
            })
            .collect();

        Ok(ChatroomDetail {
            id: room.id,
            title: room.title,
            description: room.description,
            created_at: room.created_at,
            updated_at: room.updated_at,
            messages,
        })
    }

    async fn remove_chatroom(&self, user: &User, id: ChatroomId) -> Result<(), ChatError> {
        let removed = self.store.remove_chatroom(id, user.id).await?;
        if !removed {
            return Err(ChatError::ChatroomNotFound);
        }

        self.cache.invalidate(user.id).await;

        Ok(())
    }

    async fn send_message(
        &self,
        user: &User,
        id: ChatroomId,
        content: &str,
    ) -> Result<SendOutcome, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation(
                "Message must not be empty".to_string(),
            ));
        }
        if content.len() > MAX_MESSAGE_LEN {
            return Err(ChatError::Validation(format!(
                "Message must be at most {MAX_MESSAGE_LEN} characters"
            )));
        }

        // Ownership before quota: a send to someone else's room must not
        // spend the sender's quota.
        self.store
            .get_owned_chatroom(id, user.id)
            .await?
            .ok_or(ChatError::ChatroomNotFound)?;

        match self.quota.check_and_reserve(user).await {
            Ok(()) => {}
            Err(QuotaError::DailyLimitExceeded { limit }) => {
                return Err(ChatError::QuotaExceeded { limit });
            }
            Err(QuotaError::Database(e)) => return Err(ChatError::Database(e)),
        }

        let message = match self
            .store
            .append_message(id, MessageRole::User, content, None)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                self.release_quota_or_warn(user).await;
                return Err(ChatError::Database(e.to_string()));
            }
        };

        let payload = TaskPayload {
            chatroom_id: id,
            user_message_id: MessageId::new(message.id),
            user_message_text: content.to_string(),
        };

        let task_id = match self.queue.dispatch(payload) {
            Ok(task_id) => task_id,
            Err(_) => {
                // Unwind so the rejected send costs nothing.
                self.remove_message_or_warn(MessageId::new(message.id)).await;
                self.release_quota_or_warn(user).await;
                return Err(ChatError::QueueUnavailable);
            }
        };

        let _ = self.event_bus.send(NotificationEvent::TaskQueued {
            task_id: task_id.to_string(),
            chatroom_id: id.value(),
        });

        // The append bumped updated_at and the message count.
        self.cache.invalidate(user.id).await;

        Ok(SendOutcome {
            message_id: message.id,
            task_id: task_id.to_string(),
            created_at: message.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotaConfig;
    use std::time::Duration;

    struct Fixture {
        service: SeaOrmChatService,
        store: Store,
        user: User,
        _rx: tokio::sync::mpsc::Receiver<crate::queue::QueuedTask>,
    }

    async fn fixture(queue_capacity: usize, basic_limit: i32) -> Fixture {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        let user = store.create_user("+15550004444", None).await.unwrap();

        let (queue, rx) = TaskQueue::new(queue_capacity);
        let (event_bus, _) = broadcast::channel(16);

        let service = SeaOrmChatService::new(
            store.clone(),
            ChatroomCache::new(Duration::from_secs(600)),
            QuotaTracker::new(
                store.clone(),
                &QuotaConfig {
                    basic_daily_limit: basic_limit,
                    pro_daily_limit: 1000,
                },
            ),
            queue,
            event_bus,
        );

        Fixture {
            service,
            store,
            user,
            _rx: rx,
        }
    }

    #[tokio::test]
    async fn send_persists_the_message_and_returns_a_task_id() {
        let fx = fixture(8, 5).await;
        let room = fx
            .service
            .create_chatroom(&fx.user, "room", None)
            .await
            .unwrap();

        let outcome = fx
            .service
            .send_message(&fx.user, ChatroomId::new(room.id), "hello")
            .await
            .unwrap();

        assert!(!outcome.task_id.is_empty());
        let messages = fx.store.list_messages(ChatroomId::new(room.id)).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[tokio::test]
    async fn send_to_a_foreign_room_is_not_found_and_spends_nothing() {
        let fx = fixture(8, 5).await;
        let other = fx.store.create_user("+15550005555", None).await.unwrap();
        let theirs = fx
            .store
            .create_chatroom(other.id, "theirs", None)
            .await
            .unwrap();

        let err = fx
            .service
            .send_message(&fx.user, ChatroomId::new(theirs.id), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ChatroomNotFound));

        let me = fx.store.get_user(fx.user.id).await.unwrap().unwrap();
        assert_eq!(me.daily_message_count, 0);
    }

    #[tokio::test]
    async fn quota_exhaustion_rejects_the_next_send() {
        let fx = fixture(8, 2).await;
        let room = fx
            .service
            .create_chatroom(&fx.user, "room", None)
            .await
            .unwrap();
        let room_id = ChatroomId::new(room.id);

        fx.service.send_message(&fx.user, room_id, "one").await.unwrap();
        fx.service.send_message(&fx.user, room_id, "two").await.unwrap();

        let err = fx
            .service
            .send_message(&fx.user, room_id, "three")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::QuotaExceeded { limit: 2 }));
    }

    #[tokio::test]
    async fn full_queue_unwinds_the_message_and_the_quota() {
        let fx = fixture(1, 5).await;
        let room = fx
            .service
            .create_chatroom(&fx.user, "room", None)
            .await
            .unwrap();
        let room_id = ChatroomId::new(room.id);

        // First send fills the single-slot queue (no worker is draining it).
        fx.service.send_message(&fx.user, room_id, "one").await.unwrap();
        let err = fx
            .service
            .send_message(&fx.user, room_id, "two")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::QueueUnavailable));

        // The rejected send left no message behind and spent no quota.
        assert_eq!(fx.store.count_messages(room_id).await.unwrap(), 1);
        let me = fx.store.get_user(fx.user.id).await.unwrap().unwrap();
        assert_eq!(me.daily_message_count, 1);
    }

    #[tokio::test]
    async fn removing_a_room_drops_it_from_the_list() {
        let fx = fixture(8, 5).await;
        let a = fx.service.create_chatroom(&fx.user, "a", None).await.unwrap();
        fx.service.create_chatroom(&fx.user, "b", None).await.unwrap();

        fx.service
            .remove_chatroom(&fx.user, ChatroomId::new(a.id))
            .await
            .unwrap();

        let list = fx.service.list_chatrooms(&fx.user).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "b");
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_any_side_effect() {
        let fx = fixture(8, 5).await;
        let room = fx
            .service
            .create_chatroom(&fx.user, "room", None)
            .await
            .unwrap();

        let err = fx
            .service
            .send_message(&fx.user, ChatroomId::new(room.id), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        let me = fx.store.get_user(fx.user.id).await.unwrap().unwrap();
        assert_eq!(me.daily_message_count, 0);
    }
}
