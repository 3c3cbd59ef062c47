//! Read-through cache for per-user chatroom lists.
//!
//! The cache is a plain TTL key-value map, never a source of truth: every
//! entry is recomputable from the store. Invalidation is explicit and
//! unconditional; expiry is lazy (checked on read, no eviction sweep).
//! There is no locking beyond the map itself. Last-writer-wins is fine
//! because invalidation is monotonic and stale reads self-correct at the
//! next TTL expiry or invalidation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::db::ChatroomSummary;
use crate::domain::UserId;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process key-value store with per-entry TTL.
///
/// Mirrors the external cache collaborator contract: `set(key, value, ttl)`,
/// `get(key)`, `delete(key)`.
#[derive(Clone, Default)]
pub struct KeyValueCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl KeyValueCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    /// Returns the value if present and unexpired; expired entries are
    /// dropped on the way out.
    pub async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Entry exists but is expired; lazily remove it.
        self.entries.write().await.remove(key);
        None
    }

    pub async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// Typed wrapper over [`KeyValueCache`] for chatroom summary lists.
#[derive(Clone)]
pub struct ChatroomCache {
    kv: KeyValueCache,
    ttl: Duration,
}

impl ChatroomCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            kv: KeyValueCache::new(),
            ttl,
        }
    }

    fn key(user_id: UserId) -> String {
        format!("user_chatrooms:{user_id}")
    }

    /// Returns the cached ordered list, or `None` on miss. The stored order
    /// is whatever the store computed; the cache never re-sorts.
    pub async fn read(&self, user_id: UserId) -> Option<Vec<ChatroomSummary>> {
        let raw = self.kv.get(&Self::key(user_id)).await?;

        match serde_json::from_str(&raw) {
            Ok(list) => Some(list),
            Err(e) => {
                // Treat an undecodable entry as a miss; it will be replaced
                // on the next populate.
                debug!(user_id = %user_id, error = %e, "Dropping corrupt cache entry");
                self.kv.delete(&Self::key(user_id)).await;
                None
            }
        }
    }

    /// Stores the list verbatim, replacing any prior entry.
    pub async fn populate(&self, user_id: UserId, list: &[ChatroomSummary]) {
        match serde_json::to_string(list) {
            Ok(raw) => self.kv.set(&Self::key(user_id), raw, self.ttl).await,
            Err(e) => debug!(user_id = %user_id, error = %e, "Failed to encode cache entry"),
        }
    }

    /// Unconditionally removes the user's entry. Called synchronously after
    /// every mutation that changes the chatroom set's membership or
    /// aggregate message counts.
    pub async fn invalidate(&self, user_id: UserId) {
        self.kv.delete(&Self::key(user_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: i32, title: &str) -> ChatroomSummary {
        ChatroomSummary {
            id,
            title: title.to_string(),
            description: None,
            created_at: "2026-08-01T00:00:00Z".to_string(),
            updated_at: "2026-08-01T00:00:00Z".to_string(),
            message_count: 0,
        }
    }

    #[tokio::test]
    async fn populate_then_read_preserves_order() {
        let cache = ChatroomCache::new(Duration::from_secs(600));
        let user = UserId::new(1);
        let list = vec![summary(3, "newest"), summary(1, "older"), summary(2, "oldest")];

        cache.populate(user, &list).await;

        let got = cache.read(user).await.expect("expected a hit");
        let ids: Vec<i32> = got.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn invalidate_then_read_misses() {
        let cache = ChatroomCache::new(Duration::from_secs(600));
        let user = UserId::new(1);

        cache.populate(user, &[summary(1, "a")]).await;
        cache.invalidate(user).await;

        assert!(cache.read(user).await.is_none());
    }

    #[tokio::test]
    async fn invalidating_an_absent_entry_is_a_noop() {
        let cache = ChatroomCache::new(Duration::from_secs(600));
        cache.invalidate(UserId::new(99)).await;
        assert!(cache.read(UserId::new(99)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ChatroomCache::new(Duration::from_secs(10));
        let user = UserId::new(1);

        cache.populate(user, &[summary(1, "a")]).await;
        assert!(cache.read(user).await.is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.read(user).await.is_none());
    }

    #[tokio::test]
    async fn entries_are_isolated_per_user() {
        let cache = ChatroomCache::new(Duration::from_secs(600));

        cache.populate(UserId::new(1), &[summary(1, "mine")]).await;
        cache.populate(UserId::new(2), &[summary(2, "theirs")]).await;
        cache.invalidate(UserId::new(1)).await;

        assert!(cache.read(UserId::new(1)).await.is_none());
        assert_eq!(cache.read(UserId::new(2)).await.unwrap()[0].id, 2);
    }
}
