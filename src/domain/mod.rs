//! Domain types for the chat subsystem with strong typing.
//!
//! Newtype wrappers prevent mixing the three entity id spaces (users,
//! chatrooms, messages) and give the quota and pipeline code a vocabulary
//! that matches the data model.

pub mod events;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a User.
///
/// # Examples
///
/// ```rust
/// use parlor::domain::UserId;
///
/// let id = UserId::new(42);
/// assert_eq!(id.value(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UserId(i32);

impl UserId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        debug_assert!(id >= 0, "UserId should be non-negative");
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<UserId> for i32 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

impl Serialize for UserId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = i32::deserialize(deserializer)?;
        Ok(Self::new(id))
    }
}

/// Unique identifier for a Chatroom.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChatroomId(i32);

impl ChatroomId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ChatroomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ChatroomId> for i32 {
    fn from(id: ChatroomId) -> Self {
        id.0
    }
}

impl From<i32> for ChatroomId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

/// Unique identifier for a Message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(i32);

impl MessageId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<MessageId> for i32 {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl From<i32> for MessageId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

/// Subscription tier of a user, which determines the daily message quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Basic,
    Pro,
}

impl SubscriptionTier {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Pro => "pro",
        }
    }

    /// Parses a tier from its database representation.
    ///
    /// Unknown values fall back to `Basic` so a bad row can never grant a
    /// larger quota than intended.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "pro" => Self::Pro,
            _ => Self::Basic,
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a message within a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
