//! Boundary between the archive pipeline and the chat platform.
//!
//! This module provides:
//! - `ChannelSource`: history, thread and directory enumeration
//! - `ArchiveDelivery`: posting finished shards back to a channel
//! - `EntityResolver` + `Directory`: ID → display data lookups used while rendering
//!
//! # Adding a New Platform
//!
//! 1. Implement `ChannelSource` (and `ArchiveDelivery` if uploads are wanted)
//! 2. Fill a `Directory` from the platform's member/role/channel/emoji listings
//! 3. Hand both to `ChannelExporter::new`

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Message, Snowflake, Thread};

/// Location of a custom emoji image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiRef {
    pub url: String,
}

/// Resolves platform IDs to display data. A miss returns `None`, never an error.
pub trait EntityResolver: Send + Sync {
    fn resolve_user(&self, id: Snowflake) -> Option<String>;
    fn resolve_role(&self, id: Snowflake) -> Option<String>;
    fn resolve_channel(&self, id: Snowflake) -> Option<String>;
    fn resolve_emoji(&self, id: Snowflake) -> Option<EmojiRef>;

    /// Colour of the user's highest coloured role, as `0xRRGGBB`.
    fn resolve_user_color(&self, _id: Snowflake) -> Option<u32> {
        None
    }
}

/// In-memory snapshot of the guild's members, roles, channels and emoji.
///
/// Loaded once per export so rendering never needs a remote lookup.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    users: HashMap<Snowflake, String>,
    user_colors: HashMap<Snowflake, u32>,
    roles: HashMap<Snowflake, String>,
    channels: HashMap<Snowflake, String>,
    emoji: HashMap<Snowflake, EmojiRef>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&mut self, id: Snowflake, name: impl Into<String>) {
        self.users.insert(id, name.into());
    }

    /// Record a user seen in history without clobbering a directory entry.
    pub fn remember_user(&mut self, id: Snowflake, name: &str) {
        self.users.entry(id).or_insert_with(|| name.to_string());
    }

    pub fn insert_user_color(&mut self, id: Snowflake, color: u32) {
        self.user_colors.insert(id, color);
    }

    pub fn insert_role(&mut self, id: Snowflake, name: impl Into<String>) {
        self.roles.insert(id, name.into());
    }

    pub fn insert_channel(&mut self, id: Snowflake, name: impl Into<String>) {
        self.channels.insert(id, name.into());
    }

    pub fn insert_emoji(&mut self, id: Snowflake, url: impl Into<String>) {
        self.emoji.insert(id, EmojiRef { url: url.into() });
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl EntityResolver for Directory {
    fn resolve_user(&self, id: Snowflake) -> Option<String> {
        self.users.get(&id).cloned()
    }

    fn resolve_role(&self, id: Snowflake) -> Option<String> {
        self.roles.get(&id).cloned()
    }

    fn resolve_channel(&self, id: Snowflake) -> Option<String> {
        self.channels.get(&id).cloned()
    }

    fn resolve_emoji(&self, id: Snowflake) -> Option<EmojiRef> {
        self.emoji.get(&id).cloned()
    }

    fn resolve_user_color(&self, id: Snowflake) -> Option<u32> {
        self.user_colors.get(&id).copied()
    }
}

/// Read access to a channel's history and threads.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Every message in the channel, newest first.
    async fn list_messages(&self, channel_id: Snowflake) -> Result<Vec<Message>>;

    async fn list_active_threads(&self, channel_id: Snowflake) -> Result<Vec<Thread>>;

    async fn list_archived_threads(&self, channel_id: Snowflake) -> Result<Vec<Thread>>;

    /// A single message, `None` if it no longer exists.
    async fn fetch_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<Option<Message>>;

    /// Directory snapshot for the guild that owns `channel_id`.
    async fn load_directory(&self, channel_id: Snowflake) -> Result<Directory>;
}

/// Posts messages and files to a channel.
#[async_trait]
pub trait ArchiveDelivery: Send + Sync {
    async fn send_message(&self, channel_id: Snowflake, content: &str) -> Result<()>;

    async fn upload_file(&self, channel_id: Snowflake, path: &Path, label: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_lookups() {
        let mut dir = Directory::new();
        dir.insert_user(1, "alice");
        dir.insert_role(2, "mods");
        dir.insert_channel(3, "general");
        dir.insert_emoji(4, "https://cdn.example/emojis/4.png");
        dir.insert_user_color(1, 0x3498db);

        assert_eq!(dir.resolve_user(1).as_deref(), Some("alice"));
        assert_eq!(dir.resolve_role(2).as_deref(), Some("mods"));
        assert_eq!(dir.resolve_channel(3).as_deref(), Some("general"));
        assert_eq!(
            dir.resolve_emoji(4).map(|e| e.url),
            Some("https://cdn.example/emojis/4.png".to_string())
        );
        assert_eq!(dir.resolve_user_color(1), Some(0x3498db));
        assert!(dir.resolve_user(99).is_none());
    }

    #[test]
    fn test_remember_user_keeps_directory_name() {
        let mut dir = Directory::new();
        dir.insert_user(1, "Alice (nick)");
        dir.remember_user(1, "alice");
        dir.remember_user(2, "bob");
        assert_eq!(dir.resolve_user(1).as_deref(), Some("Alice (nick)"));
        assert_eq!(dir.resolve_user(2).as_deref(), Some("bob"));
    }
}
