//! Message → HTML block.
//!
//! The composer walks a channel's history in ascending order carrying one
//! piece of state, the last message a header could be shared with.
//! Consecutive messages from the same author within five minutes on the same
//! day share the first one's header.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Duration;
use tracing::{debug, warn};

use crate::assets::url_asset_id;
use crate::model::{
    Attachment, Embed, EmbedMedia, Message, MessageKind, Reaction, ReactionEmoji, Snowflake,
    Thread,
};
use crate::render::{escape_html, Renderer};
use crate::source::ChannelSource;
use crate::threads::{thread_document_name, ThreadIndex};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";
const REPLY_SNIPPET_CHARS: usize = 100;
const DELETED_REPLY: &str = "Original message was deleted";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov"];

/// Whether `current` should reuse the header of `last`.
pub fn should_coalesce(last: Option<&Message>, current: &Message) -> bool {
    if current.is_interaction {
        return false;
    }
    let Some(last) = last else {
        return false;
    };
    if last.author.id != current.author.id {
        return false;
    }
    if last.created_at.date_naive() != current.created_at.date_naive() {
        return false;
    }
    let elapsed = current.created_at - last.created_at;
    elapsed >= Duration::zero() && elapsed <= Duration::minutes(5)
}

pub struct MessageComposer<'a> {
    renderer: &'a Renderer<'a>,
    source: &'a dyn ChannelSource,
    threads: &'a ThreadIndex,
}

impl<'a> MessageComposer<'a> {
    pub fn new(
        renderer: &'a Renderer<'a>,
        source: &'a dyn ChannelSource,
        threads: &'a ThreadIndex,
    ) -> Self {
        Self {
            renderer,
            source,
            threads,
        }
    }

    /// Compose every message of `messages` (ascending) into one HTML body.
    pub async fn compose(&self, messages: &[Message]) -> Result<String> {
        let history: HashMap<Snowflake, &Message> = messages.iter().map(|m| (m.id, m)).collect();
        let mut body = String::new();
        let mut last: Option<&Message> = None;

        for message in messages {
            let coalesce = should_coalesce(last, message);
            body.push_str(&self.compose_message(message, coalesce, &history).await?);
            body.push('\n');

            last = match message.kind {
                MessageKind::Default | MessageKind::Reply => Some(message),
                MessageKind::MemberJoin | MessageKind::ThreadCreated | MessageKind::System => None,
            };
        }

        Ok(body)
    }

    /// Compose a single message. `history` is consulted for reply targets
    /// before asking the source.
    pub async fn compose_message(
        &self,
        message: &Message,
        coalesce: bool,
        history: &HashMap<Snowflake, &Message>,
    ) -> Result<String> {
        match message.kind {
            MessageKind::MemberJoin | MessageKind::System => Ok(self.system_message(message)),
            MessageKind::ThreadCreated => Ok(self.thread_marker(message)),
            MessageKind::Reply => {
                let header = self.reply_header(message, history).await?;
                self.default_message(message, false, Some(header)).await
            }
            MessageKind::Default => self.default_message(message, coalesce, None).await,
        }
    }

    fn default_avatar(&self) -> String {
        format!("{}/embed/avatars/0.png", self.renderer.cdn_base_url())
    }

    fn timestamp(message: &Message) -> String {
        message.created_at.format(TIMESTAMP_FORMAT).to_string()
    }

    fn system_message(&self, message: &Message) -> String {
        let text = message
            .system_content
            .as_deref()
            .unwrap_or(message.content.as_str());
        format!(
            r#"<div class="messageBlock mt-20 system" id="m{id}"><div class="avatar"><img src="{avatar}"></div><div class="content"><div class="title"><span class="systemMessage">{text}</span> <span class="timestamp">{ts}</span></div></div></div>"#,
            id = message.id,
            avatar = escape_html(&self.default_avatar()),
            text = escape_html(text),
            ts = Self::timestamp(message),
        )
    }

    fn thread_marker(&self, message: &Message) -> String {
        let thread = message.thread_ref_id.and_then(|id| self.threads.get(id));
        let label = match thread {
            Some(thread) => format!("{} started a thread: {}", message.author.name, thread.name),
            None => format!("{} started a thread", message.author.name),
        };
        let link = thread.map(thread_link).unwrap_or_default();
        format!(
            r#"<div class="messageBlock mt-20 system" id="m{id}"><div class="avatar"></div><div class="content"><div class="title"><span class="systemMessage">{label}</span> <span class="timestamp">{ts}</span></div>{link}</div></div>"#,
            id = message.id,
            label = escape_html(&label),
            ts = Self::timestamp(message),
        )
    }

    async fn reply_header(
        &self,
        message: &Message,
        history: &HashMap<Snowflake, &Message>,
    ) -> Result<String> {
        let fetched;
        let target = match message.reply_target_id {
            None => None,
            Some(id) => match history.get(&id) {
                Some(found) => Some(*found),
                None => {
                    debug!("Reply target {} not in history, fetching", id);
                    let channel = message.reply_channel_id.unwrap_or(message.channel_id);
                    fetched = match self.source.fetch_message(channel, id).await {
                        Ok(found) => found,
                        Err(err) => {
                            warn!("Failed to fetch reply target {}: {:#}", id, err);
                            None
                        }
                    };
                    fetched.as_ref()
                }
            },
        };

        let Some(target) = target else {
            return Ok(format!(
                r#"<div class="replyTo"><span class="replyContent deleted">{}</span></div>"#,
                DELETED_REPLY
            ));
        };

        let name = self
            .renderer
            .resolver()
            .resolve_user(target.author.id)
            .unwrap_or_else(|| target.author.name.clone());
        let snippet = self.renderer.render_inline(&snippet(&target.content)).await?;
        Ok(format!(
            r##"<div class="replyTo"><a href="#m{id}"><span class="replyAuthor">@{name}</span></a> <span class="replyContent">{snippet}</span></div>"##,
            id = target.id,
            name = escape_html(&name),
        ))
    }

    async fn default_message(
        &self,
        message: &Message,
        coalesce: bool,
        reply_header: Option<String>,
    ) -> Result<String> {
        let mut html = String::new();

        if coalesce {
            html.push_str(&format!(
                r#"<div class="messageBlock mt-10" id="m{}"><div class="avatar"></div><div class="content">"#,
                message.id
            ));
        } else {
            let avatar = message
                .author
                .avatar_url
                .clone()
                .unwrap_or_else(|| self.default_avatar());
            html.push_str(&format!(
                r#"<div class="messageBlock mt-20" id="m{}"><div class="avatar"><img src="{}"></div><div class="content">"#,
                message.id,
                escape_html(&avatar)
            ));
            if let Some(header) = reply_header {
                html.push_str(&header);
            }
            html.push_str(&self.title(message));
        }

        if !message.content.is_empty() {
            let body = self.renderer.render(&message.content).await?;
            html.push_str(&format!(r#"<div class="body">{}</div>"#, body));
        }
        for attachment in &message.attachments {
            html.push_str(&self.attachment(attachment).await?);
        }
        for embed in &message.embeds {
            html.push_str(&self.embed(embed).await?);
        }
        html.push_str(&self.reactions(&message.reactions).await?);
        if let Some(thread) = self.threads.get(message.id) {
            html.push_str(&thread_link(thread));
        }

        html.push_str("</div></div>");
        Ok(html)
    }

    fn title(&self, message: &Message) -> String {
        let resolver = self.renderer.resolver();
        let name = resolver
            .resolve_user(message.author.id)
            .unwrap_or_else(|| message.author.name.clone());
        let style = resolver
            .resolve_user_color(message.author.id)
            .map(|color| format!(r#" style="color: #{:06x}""#, color))
            .unwrap_or_default();
        let bot = if message.author.bot {
            r#" <span class="botTag">BOT</span>"#
        } else {
            ""
        };
        format!(
            r#"<div class="title"><span class="username"{style}>{name}</span>{bot} <span class="timestamp">{ts}</span></div>"#,
            name = escape_html(&name),
            ts = Self::timestamp(message),
        )
    }

    async fn attachment(&self, attachment: &Attachment) -> Result<String> {
        let asset_id = attachment.id.to_string();
        let asset = match attachment.proxy_url.as_deref() {
            Some(proxy) => {
                self.renderer
                    .assets()
                    .fetch(&asset_id, proxy, Some(&attachment.url))
                    .await?
            }
            None => {
                self.renderer
                    .assets()
                    .fetch(&asset_id, &attachment.url, None)
                    .await?
            }
        };
        let src = escape_html(&asset.relative_path);
        let ext = attachment
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        Ok(if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            format!(
                r#"<div class="attachment"><a href="{src}"><img class="attachmentImage" src="{src}" alt="{}"></a></div>"#,
                escape_html(&attachment.filename)
            )
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            format!(
                r#"<div class="attachment"><video width="400" controls><source src="{src}"></video></div>"#
            )
        } else {
            format!(
                r#"<div class="attachment"><a href="{src}" download>Download {}</a></div>"#,
                escape_html(&attachment.filename)
            )
        })
    }

    async fn embed(&self, embed: &Embed) -> Result<String> {
        let mut html = String::from(r#"<div class="embed">"#);
        let color = embed.color.unwrap_or(0x202225);
        html.push_str(&format!(
            r#"<div class="embedColor" style="background-color: #{:06x}"></div><div class="embedContent">"#,
            color
        ));

        if let Some(author) = &embed.author {
            html.push_str(r#"<div class="embedAuthor">"#);
            if let Some(icon) = &author.icon_url {
                let src = self.media_src(icon, None).await?;
                html.push_str(&format!(
                    r#"<img class="embedAuthorIcon" src="{}">"#,
                    escape_html(&src)
                ));
            }
            let name = escape_html(&author.name);
            match &author.url {
                Some(url) => html.push_str(&format!(
                    r#"<a href="{}">{}</a>"#,
                    escape_html(url),
                    name
                )),
                None => html.push_str(&name),
            }
            html.push_str("</div>");
        }

        if let Some(title) = &embed.title {
            let title = self.renderer.render_inline(title).await?;
            match &embed.url {
                Some(url) => html.push_str(&format!(
                    r#"<div class="embedTitle"><a href="{}">{}</a></div>"#,
                    escape_html(url),
                    title
                )),
                None => html.push_str(&format!(r#"<div class="embedTitle">{}</div>"#, title)),
            }
        }

        if let Some(description) = &embed.description {
            html.push_str(&format!(
                r#"<div class="embedDescription">{}</div>"#,
                self.renderer.render(description).await?
            ));
        }

        if !embed.fields.is_empty() {
            html.push_str(r#"<div class="embedFields">"#);
            for field in &embed.fields {
                let class = if field.inline { "fieldInline" } else { "field" };
                html.push_str(&format!(
                    r#"<div class="{class}"><div class="fieldName">{}</div><div class="fieldValue">{}</div></div>"#,
                    self.renderer.render_inline(&field.name).await?,
                    self.renderer.render(&field.value).await?
                ));
            }
            html.push_str("</div>");
        }

        if let Some(image) = &embed.image {
            let src = self.embed_media_src(image).await?;
            html.push_str(&format!(
                r#"<div class="embedImage"><img src="{}"></div>"#,
                escape_html(&src)
            ));
        }

        if let Some(footer) = &embed.footer {
            html.push_str(&format!(
                r#"<div class="embedFooter">{}</div>"#,
                escape_html(footer)
            ));
        }

        html.push_str("</div>");
        if let Some(thumbnail) = &embed.thumbnail {
            let src = self.embed_media_src(thumbnail).await?;
            html.push_str(&format!(
                r#"<div class="embedThumbnail"><img src="{}"></div>"#,
                escape_html(&src)
            ));
        }
        html.push_str("</div>");
        Ok(html)
    }

    async fn embed_media_src(&self, media: &EmbedMedia) -> Result<String> {
        self.media_src(&media.url, media.proxy_url.as_deref()).await
    }

    /// Cache embed media under a URL-derived ID. Falls back to the remote URL
    /// when neither address could be downloaded.
    async fn media_src(&self, url: &str, fallback: Option<&str>) -> Result<String> {
        let asset = self
            .renderer
            .assets()
            .fetch(&url_asset_id(url), url, fallback)
            .await?;
        Ok(if asset.available {
            asset.relative_path
        } else {
            url.to_string()
        })
    }

    async fn reactions(&self, reactions: &[Reaction]) -> Result<String> {
        if reactions.is_empty() {
            return Ok(String::new());
        }
        let mut html = String::from(r#"<div class="reactions">"#);
        for reaction in reactions {
            let emoji = match &reaction.emoji {
                ReactionEmoji::Unicode(text) => escape_html(text),
                ReactionEmoji::Custom { id, name, animated } => {
                    match self.renderer.custom_emoji_src(*id, *animated).await? {
                        Some(src) => format!(
                            r#"<img class="emoji" src="{}" alt=":{name}:" title=":{name}:">"#,
                            src,
                            name = escape_html(name)
                        ),
                        None => escape_html(&format!(":{}:", name)),
                    }
                }
            };
            html.push_str(&format!(
                r#"<div class="reaction"><span class="reactionEmoji">{}</span><span class="reactionCount">{}</span></div>"#,
                emoji, reaction.count
            ));
        }
        html.push_str("</div>");
        Ok(html)
    }
}

fn thread_link(thread: &Thread) -> String {
    let noun = if thread.message_count == 1 {
        "message"
    } else {
        "messages"
    };
    format!(
        r#"<div class="threadLink"><a href="./{file}"><span class="threadName">{name}</span> <span class="threadCount">{count} {noun}</span></a></div>"#,
        file = thread_document_name(thread.id),
        name = escape_html(&thread.name),
        count = thread.message_count,
    )
}

/// First line of `text`, cut to a fixed number of characters.
fn snippet(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= REPLY_SNIPPET_CHARS {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(REPLY_SNIPPET_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetCache;
    use crate::model::{Author, EmbedField};
    use crate::source::Directory;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const OFFLINE_CDN: &str = "http://127.0.0.1:9";

    #[derive(Default)]
    struct ReplySource {
        stored: HashMap<Snowflake, Message>,
        fetches: Mutex<Vec<(Snowflake, Snowflake)>>,
    }

    #[async_trait]
    impl ChannelSource for ReplySource {
        async fn list_messages(&self, _channel_id: Snowflake) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn list_active_threads(&self, _channel_id: Snowflake) -> Result<Vec<Thread>> {
            Ok(Vec::new())
        }

        async fn list_archived_threads(&self, _channel_id: Snowflake) -> Result<Vec<Thread>> {
            Ok(Vec::new())
        }

        async fn fetch_message(
            &self,
            channel_id: Snowflake,
            message_id: Snowflake,
        ) -> Result<Option<Message>> {
            self.fetches.lock().unwrap().push((channel_id, message_id));
            Ok(self.stored.get(&message_id).cloned())
        }

        async fn load_directory(&self, _channel_id: Snowflake) -> Result<Directory> {
            Ok(Directory::new())
        }
    }

    fn author(id: Snowflake, name: &str) -> Author {
        Author {
            id,
            name: name.to_string(),
            avatar_url: None,
            bot: false,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn msg(id: Snowflake, author_id: Snowflake, time: DateTime<Utc>, content: &str) -> Message {
        Message::text(id, 100, author(author_id, "alice"), time, content)
    }

    async fn compose_with(
        messages: &[Message],
        source: &ReplySource,
        threads: &ThreadIndex,
    ) -> String {
        let dir = TempDir::new().unwrap();
        let assets = AssetCache::new(dir.path(), reqwest::Client::new());
        assets.ensure_dir().unwrap();
        let mut directory = Directory::new();
        directory.insert_user(1, "Alice");
        directory.insert_user_color(1, 0x1abc9c);
        let renderer = Renderer::new(&directory, &assets, OFFLINE_CDN);
        MessageComposer::new(&renderer, source, threads)
            .compose(messages)
            .await
            .unwrap()
    }

    #[test]
    fn test_coalesce_within_window() {
        let first = msg(1, 1, at(12, 0, 0), "a");
        assert!(should_coalesce(Some(&first), &msg(2, 1, at(12, 4, 59), "b")));
        assert!(should_coalesce(Some(&first), &msg(2, 1, at(12, 5, 0), "b")));
        assert!(!should_coalesce(Some(&first), &msg(2, 1, at(12, 5, 1), "b")));
    }

    #[test]
    fn test_coalesce_requires_same_author_and_day() {
        let first = msg(1, 1, at(12, 0, 0), "a");
        assert!(!should_coalesce(None, &first));
        assert!(!should_coalesce(Some(&first), &msg(2, 2, at(12, 1, 0), "b")));

        let late = msg(3, 1, Utc.with_ymd_and_hms(2024, 3, 1, 23, 58, 0).unwrap(), "c");
        let after_midnight = msg(4, 1, Utc.with_ymd_and_hms(2024, 3, 2, 0, 1, 0).unwrap(), "d");
        assert!(!should_coalesce(Some(&late), &after_midnight));

        // Same day-of-month, different month.
        let march = msg(5, 1, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(), "e");
        let april = msg(6, 1, Utc.with_ymd_and_hms(2024, 4, 1, 12, 1, 0).unwrap(), "f");
        assert!(!should_coalesce(Some(&march), &april));
    }

    #[test]
    fn test_interaction_never_coalesces() {
        let first = msg(1, 1, at(12, 0, 0), "a");
        let mut second = msg(2, 1, at(12, 0, 30), "b");
        second.is_interaction = true;
        assert!(!should_coalesce(Some(&first), &second));
    }

    #[tokio::test]
    async fn test_coalesced_messages_share_header() {
        let messages = vec![
            msg(1, 1, at(12, 0, 0), "first"),
            msg(2, 1, at(12, 3, 0), "second"),
            msg(3, 1, at(12, 9, 0), "third"),
        ];
        let html = compose_with(&messages, &ReplySource::default(), &ThreadIndex::default()).await;

        assert_eq!(html.matches(r#"class="title""#).count(), 2);
        assert!(html.contains(r#"<div class="messageBlock mt-10" id="m2">"#));
        assert!(html.contains(r#"<span class="username" style="color: #1abc9c">Alice</span>"#));
        assert!(html.contains(r#"<span class="timestamp">2024-03-01 12:00</span>"#));
    }

    #[tokio::test]
    async fn test_system_message_resets_coalescing() {
        let mut join = msg(2, 1, at(12, 1, 0), "");
        join.kind = MessageKind::MemberJoin;
        join.system_content = Some("<b>Alice</b> joined".to_string());
        let messages = vec![
            msg(1, 1, at(12, 0, 0), "first"),
            join,
            msg(3, 1, at(12, 2, 0), "third"),
        ];
        let html = compose_with(&messages, &ReplySource::default(), &ThreadIndex::default()).await;

        assert!(html.contains("&lt;b&gt;Alice&lt;/b&gt; joined"));
        assert!(!html.contains("mt-10"));
    }

    #[tokio::test]
    async fn test_reply_uses_history_then_source() {
        let mut source = ReplySource::default();
        source
            .stored
            .insert(50, msg(50, 2, at(11, 0, 0), "older **post**"));

        let mut in_history = msg(2, 2, at(12, 1, 0), "reply one");
        in_history.kind = MessageKind::Reply;
        in_history.reply_target_id = Some(1);
        let mut remote = msg(3, 2, at(12, 2, 0), "reply two");
        remote.kind = MessageKind::Reply;
        remote.reply_target_id = Some(50);
        let mut deleted = msg(4, 2, at(12, 3, 0), "reply three");
        deleted.kind = MessageKind::Reply;
        deleted.reply_target_id = Some(99);

        let messages = vec![msg(1, 1, at(12, 0, 0), "hello"), in_history, remote, deleted];
        let html = compose_with(&messages, &source, &ThreadIndex::default()).await;

        assert!(html.contains(r##"<a href="#m1"><span class="replyAuthor">@Alice</span></a> <span class="replyContent">hello</span>"##));
        assert!(html.contains(r#"<span class="replyContent">older <strong>post</strong></span>"#));
        assert!(html.contains(DELETED_REPLY));
        assert_eq!(*source.fetches.lock().unwrap(), vec![(100, 50), (100, 99)]);
        // Replies always carry their own header.
        assert_eq!(html.matches(r#"class="title""#).count(), 4);
    }

    #[tokio::test]
    async fn test_thread_starter_quotes_parent_channel() {
        let mut source = ReplySource::default();
        source
            .stored
            .insert(50, msg(50, 2, at(11, 0, 0), "shall we plan?"));

        let mut starter = Message::text(60, 40, author(2, "alice"), at(12, 0, 0), "");
        starter.kind = MessageKind::Reply;
        starter.reply_target_id = Some(50);
        starter.reply_channel_id = Some(100);

        let html = compose_with(&[starter], &source, &ThreadIndex::default()).await;

        assert!(html.contains(r#"<span class="replyContent">shall we plan?</span>"#));
        assert!(!html.contains(DELETED_REPLY));
        assert_eq!(*source.fetches.lock().unwrap(), vec![(100, 50)]);
    }

    #[tokio::test]
    async fn test_thread_links() {
        let threads = ThreadIndex::from_threads([Thread {
            id: 1,
            name: "planning".to_string(),
            message_count: 1,
            parent_channel_id: 100,
        }]);
        let mut marker = msg(2, 1, at(12, 0, 10), "planning");
        marker.kind = MessageKind::ThreadCreated;
        marker.thread_ref_id = Some(1);

        let messages = vec![msg(1, 1, at(12, 0, 0), "let's plan"), marker];
        let html = compose_with(&messages, &ReplySource::default(), &threads).await;

        assert_eq!(
            html.matches(r#"<a href="./thread_1_index.html"><span class="threadName">planning</span> <span class="threadCount">1 message</span></a>"#).count(),
            2
        );
        assert!(html.contains("alice started a thread: planning"));
    }

    #[tokio::test]
    async fn test_attachments_by_extension() {
        let mut message = msg(1, 1, at(12, 0, 0), "");
        for (id, name) in [(11, "cat.PNG"), (12, "clip.mp4"), (13, "notes.txt")] {
            message.attachments.push(Attachment {
                id,
                filename: name.to_string(),
                url: format!("{}/attachments/{}/{}", OFFLINE_CDN, id, name),
                proxy_url: None,
            });
        }
        let html = compose_with(&[message], &ReplySource::default(), &ThreadIndex::default()).await;

        assert!(html.contains(r#"<img class="attachmentImage" src="./assets/11.PNG" alt="cat.PNG">"#));
        assert!(html.contains(r#"<source src="./assets/12.mp4">"#));
        assert!(html.contains(r#"<a href="./assets/13.txt" download>Download notes.txt</a>"#));
        assert!(!html.contains(r#"class="body""#));
    }

    #[tokio::test]
    async fn test_embed_and_reactions() {
        let mut message = msg(1, 1, at(12, 0, 0), "see");
        message.embeds.push(Embed {
            title: Some("Release **1.0**".to_string()),
            url: Some("https://example.com/r".to_string()),
            description: Some("notes".to_string()),
            color: Some(0xff0000),
            fields: vec![
                EmbedField {
                    name: "a".to_string(),
                    value: "1".to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "b".to_string(),
                    value: "2".to_string(),
                    inline: false,
                },
            ],
            footer: Some("bot & co".to_string()),
            ..Embed::default()
        });
        message.reactions = vec![
            Reaction {
                emoji: ReactionEmoji::Unicode("👍".to_string()),
                count: 3,
            },
            Reaction {
                emoji: ReactionEmoji::Custom {
                    id: 77,
                    name: "party".to_string(),
                    animated: false,
                },
                count: 1,
            },
        ];
        let html = compose_with(&[message], &ReplySource::default(), &ThreadIndex::default()).await;

        assert!(html.contains(r#"style="background-color: #ff0000""#));
        assert!(html.contains(r#"<a href="https://example.com/r">Release <strong>1.0</strong></a>"#));
        assert!(html.contains(r#"<div class="fieldInline"><div class="fieldName">a</div>"#));
        assert!(html.contains(r#"<div class="field"><div class="fieldName">b</div>"#));
        assert!(html.contains(r#"<div class="embedFooter">bot &amp; co</div>"#));
        assert!(html.contains(r#"<span class="reactionEmoji">👍</span><span class="reactionCount">3</span>"#));
        // Custom emoji CDN is unreachable, so the name is shown.
        assert!(html.contains(r#"<span class="reactionEmoji">:party:</span>"#));
    }

    #[test]
    fn test_snippet_truncates_first_line() {
        assert_eq!(snippet("one\ntwo"), "one");
        let long = "x".repeat(150);
        assert_eq!(snippet(&long), format!("{}...", "x".repeat(100)));
    }
}
