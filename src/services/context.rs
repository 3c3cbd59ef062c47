//! Conversation context assembly for the generation pipeline.
//!
//! Builds the bounded window handed to the generator: the most recent
//! persisted turns in chronological order, ending with the triggering user
//! message. The trigger travels in the task payload and is excluded from the
//! history query, so it appears exactly once regardless of read-after-write
//! visibility.

use anyhow::Result;

use crate::clients::ChatTurn;
use crate::db::Store;
use crate::domain::{ChatroomId, MessageId, MessageRole};

#[derive(Clone)]
pub struct ContextAssembler {
    store: Store,
    max_messages: u64,
}

impl ContextAssembler {
    #[must_use]
    pub const fn new(store: Store, max_messages: u64) -> Self {
        Self { store, max_messages }
    }

    /// Returns at most `max_messages` turns, oldest first, with the trigger
    /// as the final turn. Older context is silently dropped.
    pub async fn assemble(
        &self,
        chatroom_id: ChatroomId,
        trigger_id: MessageId,
        trigger_text: &str,
    ) -> Result<Vec<ChatTurn>> {
        let history_budget = self.max_messages.saturating_sub(1);

        let mut turns = if history_budget == 0 {
            Vec::with_capacity(1)
        } else {
            let mut recent = self
                .store
                .recent_messages(chatroom_id, history_budget, Some(trigger_id))
                .await?;

            // The window query returns newest first.
            recent.reverse();

            recent
                .into_iter()
                .map(|m| ChatTurn {
                    role: if m.role == MessageRole::Assistant.as_str() {
                        MessageRole::Assistant
                    } else {
                        MessageRole::User
                    },
                    content: m.content,
                })
                .collect()
        };

        turns.push(ChatTurn {
            role: MessageRole::User,
            content: trigger_text.to_string(),
        });

        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_room() -> (Store, ChatroomId) {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        let user = store.create_user("+15550002222", None).await.unwrap();
        let room = store
            .create_chatroom(user.id, "context", None)
            .await
            .unwrap();
        (store, ChatroomId::new(room.id))
    }

    #[tokio::test]
    async fn window_is_bounded_and_ends_with_the_trigger() {
        let (store, room) = store_with_room().await;

        for n in 0..15 {
            let role = if n % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            store
                .append_message(room, role, &format!("turn {n}"), None)
                .await
                .unwrap();
        }
        let trigger = store
            .append_message(room, MessageRole::User, "the trigger", None)
            .await
            .unwrap();

        let assembler = ContextAssembler::new(store, 10);
        let turns = assembler
            .assemble(room, MessageId::new(trigger.id), "the trigger")
            .await
            .unwrap();

        assert_eq!(turns.len(), 10);
        assert_eq!(turns.last().unwrap().content, "the trigger");
        // The 9 history slots hold the most recent persisted turns, in order.
        assert_eq!(turns[0].content, "turn 6");
        assert_eq!(turns[8].content, "turn 14");
    }

    #[tokio::test]
    async fn trigger_appears_exactly_once() {
        let (store, room) = store_with_room().await;

        let trigger = store
            .append_message(room, MessageRole::User, "hello", None)
            .await
            .unwrap();

        let assembler = ContextAssembler::new(store, 10);
        let turns = assembler
            .assemble(room, MessageId::new(trigger.id), "hello")
            .await
            .unwrap();

        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn a_window_of_one_carries_only_the_trigger() {
        let (store, room) = store_with_room().await;

        store
            .append_message(room, MessageRole::User, "earlier", None)
            .await
            .unwrap();
        let trigger = store
            .append_message(room, MessageRole::User, "now", None)
            .await
            .unwrap();

        let assembler = ContextAssembler::new(store, 1);
        let turns = assembler
            .assemble(room, MessageId::new(trigger.id), "now")
            .await
            .unwrap();

        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "now");
    }
}
