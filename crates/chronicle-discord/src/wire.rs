//! Discord REST payloads and their conversion into chronicle's model.

use chrono::{DateTime, Utc};
use serde::de::{self, IgnoredAny};
use serde::{Deserialize, Deserializer};

use chronicle_core::{
    Attachment, Author, Embed, EmbedAuthor, EmbedField, EmbedMedia, Message, MessageKind,
    Reaction, ReactionEmoji, Snowflake, Thread,
};

// Message type codes from the Discord API.
const TYPE_DEFAULT: u8 = 0;
const TYPE_CHANNEL_NAME_CHANGE: u8 = 4;
const TYPE_CHANNEL_PINNED_MESSAGE: u8 = 6;
const TYPE_USER_JOIN: u8 = 7;
const TYPE_GUILD_BOOST: u8 = 8;
const TYPE_GUILD_BOOST_TIER_3: u8 = 11;
const TYPE_THREAD_CREATED: u8 = 18;
const TYPE_REPLY: u8 = 19;
const TYPE_THREAD_STARTER_MESSAGE: u8 = 21;
const TYPE_CHAT_INPUT_COMMAND: u8 = 20;
const TYPE_CONTEXT_MENU_COMMAND: u8 = 23;

/// Snowflakes arrive as strings; accept bare numbers too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Str(String),
    Num(u64),
}

impl RawSnowflake {
    fn parse<E: de::Error>(self) -> Result<Snowflake, E> {
        match self {
            RawSnowflake::Str(s) => s.parse().map_err(E::custom),
            RawSnowflake::Num(n) => Ok(n),
        }
    }
}

fn snowflake<'de, D: Deserializer<'de>>(d: D) -> Result<Snowflake, D::Error> {
    RawSnowflake::deserialize(d)?.parse()
}

fn opt_snowflake<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Snowflake>, D::Error> {
    Option::<RawSnowflake>::deserialize(d)?
        .map(RawSnowflake::parse)
        .transpose()
}

fn snowflakes<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Snowflake>, D::Error> {
    Vec::<RawSnowflake>::deserialize(d)?
        .into_iter()
        .map(RawSnowflake::parse)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireUser {
    #[serde(deserialize_with = "snowflake")]
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl WireUser {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    fn into_author(self, cdn: &str) -> Author {
        let avatar_url = self
            .avatar
            .as_ref()
            .map(|hash| format!("{}/avatars/{}/{}.png", cdn, self.id, hash));
        Author {
            id: self.id,
            name: self.display_name().to_string(),
            avatar_url,
            bot: self.bot,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireAttachment {
    #[serde(deserialize_with = "snowflake")]
    id: Snowflake,
    filename: String,
    url: String,
    #[serde(default)]
    proxy_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireEmbedAuthor {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    icon_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireEmbedField {
    name: String,
    value: String,
    #[serde(default)]
    inline: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireEmbedMedia {
    url: String,
    #[serde(default)]
    proxy_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireEmbedFooter {
    text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireEmbed {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    color: Option<u32>,
    #[serde(default)]
    author: Option<WireEmbedAuthor>,
    #[serde(default)]
    fields: Vec<WireEmbedField>,
    #[serde(default)]
    thumbnail: Option<WireEmbedMedia>,
    #[serde(default)]
    image: Option<WireEmbedMedia>,
    #[serde(default)]
    footer: Option<WireEmbedFooter>,
}

impl From<WireEmbed> for Embed {
    fn from(wire: WireEmbed) -> Self {
        let media = |m: WireEmbedMedia| EmbedMedia {
            url: m.url,
            proxy_url: m.proxy_url,
        };
        Embed {
            title: wire.title,
            description: wire.description,
            url: wire.url,
            color: wire.color,
            author: wire.author.map(|a| EmbedAuthor {
                name: a.name,
                url: a.url,
                icon_url: a.icon_url,
            }),
            fields: wire
                .fields
                .into_iter()
                .map(|f| EmbedField {
                    name: f.name,
                    value: f.value,
                    inline: f.inline,
                })
                .collect(),
            thumbnail: wire.thumbnail.map(media),
            image: wire.image.map(media),
            footer: wire.footer.map(|f| f.text),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireReactionEmoji {
    #[serde(default, deserialize_with = "opt_snowflake")]
    id: Option<Snowflake>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    animated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireReaction {
    count: u32,
    emoji: WireReactionEmoji,
}

impl From<WireReaction> for Reaction {
    fn from(wire: WireReaction) -> Self {
        let name = wire.emoji.name.unwrap_or_default();
        let emoji = match wire.emoji.id {
            Some(id) => ReactionEmoji::Custom {
                id,
                name,
                animated: wire.emoji.animated,
            },
            None => ReactionEmoji::Unicode(name),
        };
        Reaction {
            emoji,
            count: wire.count,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireMessageReference {
    #[serde(default, deserialize_with = "opt_snowflake")]
    message_id: Option<Snowflake>,
    #[serde(default, deserialize_with = "opt_snowflake")]
    channel_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(deserialize_with = "snowflake")]
    pub id: Snowflake,
    #[serde(deserialize_with = "snowflake")]
    channel_id: Snowflake,
    author: WireUser,
    #[serde(default)]
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(rename = "type", default)]
    kind: u8,
    #[serde(default)]
    attachments: Vec<WireAttachment>,
    #[serde(default)]
    embeds: Vec<WireEmbed>,
    #[serde(default)]
    reactions: Vec<WireReaction>,
    #[serde(default)]
    message_reference: Option<WireMessageReference>,
    #[serde(default)]
    interaction: Option<IgnoredAny>,
    #[serde(default)]
    interaction_metadata: Option<IgnoredAny>,
}

impl WireMessage {
    pub fn into_message(self, cdn: &str) -> Message {
        let is_interaction = self.interaction.is_some()
            || self.interaction_metadata.is_some()
            || matches!(self.kind, TYPE_CHAT_INPUT_COMMAND | TYPE_CONTEXT_MENU_COMMAND);
        let kind = message_kind(self.kind);
        let reference = self.message_reference;
        let author = self.author.into_author(cdn);

        let system_content = kind
            .is_system()
            .then(|| system_text(self.kind, &author.name, &self.content));
        let (reply_target_id, reply_channel_id) = match (kind, reference.as_ref()) {
            (MessageKind::Reply, Some(r)) => (
                r.message_id,
                r.channel_id.filter(|&channel| channel != self.channel_id),
            ),
            _ => (None, None),
        };
        let thread_ref_id = match kind {
            MessageKind::ThreadCreated => reference.as_ref().and_then(|r| r.channel_id),
            _ => None,
        };

        Message {
            id: self.id,
            channel_id: self.channel_id,
            author,
            created_at: self.timestamp,
            content: self.content,
            attachments: self
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    id: a.id,
                    filename: a.filename,
                    url: a.url,
                    proxy_url: a.proxy_url,
                })
                .collect(),
            embeds: self.embeds.into_iter().map(Embed::from).collect(),
            reactions: self.reactions.into_iter().map(Reaction::from).collect(),
            kind,
            reply_target_id,
            reply_channel_id,
            thread_ref_id,
            system_content,
            is_interaction,
        }
    }
}

fn message_kind(code: u8) -> MessageKind {
    match code {
        TYPE_DEFAULT | TYPE_CHAT_INPUT_COMMAND | TYPE_CONTEXT_MENU_COMMAND => MessageKind::Default,
        // A thread's first message quotes the parent message it was started from.
        TYPE_REPLY | TYPE_THREAD_STARTER_MESSAGE => MessageKind::Reply,
        TYPE_USER_JOIN => MessageKind::MemberJoin,
        TYPE_THREAD_CREATED => MessageKind::ThreadCreated,
        _ => MessageKind::System,
    }
}

fn system_text(code: u8, name: &str, content: &str) -> String {
    match code {
        TYPE_USER_JOIN => format!("{} joined the server.", name),
        TYPE_CHANNEL_PINNED_MESSAGE => format!("{} pinned a message to this channel.", name),
        TYPE_CHANNEL_NAME_CHANGE => format!("{} changed the channel name: {}", name, content),
        TYPE_GUILD_BOOST..=TYPE_GUILD_BOOST_TIER_3 => format!("{} boosted the server!", name),
        _ if !content.is_empty() => content.to_string(),
        _ => format!("{} performed a system action.", name),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireThreadMetadata {
    #[serde(default)]
    pub archive_timestamp: Option<String>,
}

/// A channel or thread object.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireChannel {
    #[serde(deserialize_with = "snowflake")]
    pub id: Snowflake,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub guild_id: Option<Snowflake>,
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub parent_id: Option<Snowflake>,
    #[serde(default)]
    pub message_count: Option<u32>,
    #[serde(default)]
    pub thread_metadata: Option<WireThreadMetadata>,
}

impl WireChannel {
    pub fn into_thread(self, parent: Snowflake) -> Thread {
        Thread {
            id: self.id,
            name: self.name.unwrap_or_else(|| self.id.to_string()),
            message_count: self.message_count.unwrap_or(0),
            parent_channel_id: self.parent_id.unwrap_or(parent),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireThreadList {
    #[serde(default)]
    pub threads: Vec<WireChannel>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireMember {
    pub user: WireUser,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default, deserialize_with = "snowflakes")]
    pub roles: Vec<Snowflake>,
}

impl WireMember {
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or_else(|| self.user.display_name())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireRole {
    #[serde(deserialize_with = "snowflake")]
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireEmoji {
    #[serde(default, deserialize_with = "opt_snowflake")]
    pub id: Option<Snowflake>,
    #[serde(default)]
    pub animated: bool,
}
