//! Snapshot types for messages, threads and export jobs.
//!
//! These are fetched once from a [`ChannelSource`](crate::ChannelSource) and
//! never mutated afterwards.

use chrono::{DateTime, Utc};

/// Platform identifier (Discord snowflake).
pub type Snowflake = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: Snowflake,
    /// Display name (global name or username).
    pub name: String,
    pub avatar_url: Option<String>,
    pub bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Default,
    Reply,
    MemberJoin,
    /// System marker announcing a thread; `thread_ref_id` names it.
    ThreadCreated,
    /// Any other platform-generated message (pins, boosts, ...).
    System,
}

impl MessageKind {
    pub fn is_system(self) -> bool {
        matches!(self, MessageKind::MemberJoin | MessageKind::System)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: Snowflake,
    pub filename: String,
    pub url: String,
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedMedia {
    pub url: String,
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    /// RGB colour as `0xRRGGBB`.
    pub color: Option<u32>,
    pub author: Option<EmbedAuthor>,
    pub fields: Vec<EmbedField>,
    pub thumbnail: Option<EmbedMedia>,
    pub image: Option<EmbedMedia>,
    pub footer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionEmoji {
    Unicode(String),
    Custom {
        id: Snowflake,
        name: String,
        animated: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: ReactionEmoji,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
    pub reactions: Vec<Reaction>,
    pub kind: MessageKind,
    pub reply_target_id: Option<Snowflake>,
    /// Channel holding the reply target when it is not this message's own
    /// channel (a thread's starter message lives in the parent).
    pub reply_channel_id: Option<Snowflake>,
    pub thread_ref_id: Option<Snowflake>,
    pub system_content: Option<String>,
    /// Posted in response to a slash command or component interaction.
    pub is_interaction: bool,
}

impl Message {
    /// A plain user message with no attachments, embeds or reactions.
    pub fn text(
        id: Snowflake,
        channel_id: Snowflake,
        author: Author,
        created_at: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id,
            channel_id,
            author,
            created_at,
            content: content.into(),
            attachments: Vec::new(),
            embeds: Vec::new(),
            reactions: Vec::new(),
            kind: MessageKind::Default,
            reply_target_id: None,
            reply_channel_id: None,
            thread_ref_id: None,
            system_content: None,
            is_interaction: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub id: Snowflake,
    pub name: String,
    pub message_count: u32,
    pub parent_channel_id: Snowflake,
}

/// A request to archive one channel, optionally posting the shards elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportJob {
    pub source_channel_id: Snowflake,
    pub destination_channel_id: Option<Snowflake>,
}

impl ExportJob {
    pub fn new(source_channel_id: Snowflake, destination_channel_id: Option<Snowflake>) -> Self {
        Self {
            source_channel_id,
            destination_channel_id,
        }
    }
}
