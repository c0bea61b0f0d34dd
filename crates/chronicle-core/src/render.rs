//! Token stream → HTML fragment.
//!
//! Only [`TokenKind::Text`] goes through the inline markdown pass; code spans
//! are escaped and emitted as-is, which is why tokenizing comes first.

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::assets::AssetCache;
use crate::markdown::{tokenize_with, Mode, Token, TokenKind};
use crate::source::EntityResolver;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold regex"));
static ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*([^*\s](?:[^*]*[^*\s])?)\*").expect("italic regex"));
static UNDERLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_]+)__").expect("underline regex"));
static STRIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~([^~]+)~~").expect("strike regex"));
static SPOILER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|\|([^|]+)\|\|").expect("spoiler regex"));

pub const UNKNOWN_USER: &str = "unknown user";
pub const UNKNOWN_ROLE: &str = "unknown role";
pub const UNKNOWN_CHANNEL: &str = "unknown channel";

type RenderFuture<'s> = Pin<Box<dyn Future<Output = Result<String>> + Send + 's>>;

/// Escape text for use in HTML content or a double-quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn newline_to_break(text: &str) -> String {
    text.replace('\n', "<br>")
}

/// Emphasis substitution over already-escaped text.
pub fn inline_markdown(escaped: &str) -> String {
    let html = BOLD.replace_all(escaped, "<strong>$1</strong>");
    let html = ITALIC.replace_all(&html, "<em>$1</em>");
    let html = UNDERLINE.replace_all(&html, r#"<span class="underline">$1</span>"#);
    let html = STRIKE.replace_all(&html, "<s>$1</s>");
    let html = SPOILER.replace_all(&html, r#"<span class="spoiler">$1</span>"#);
    html.into_owned()
}

fn is_web_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub struct Renderer<'a> {
    resolver: &'a dyn EntityResolver,
    assets: &'a AssetCache,
    cdn_base_url: &'a str,
}

impl<'a> Renderer<'a> {
    pub fn new(
        resolver: &'a dyn EntityResolver,
        assets: &'a AssetCache,
        cdn_base_url: &'a str,
    ) -> Self {
        Self {
            resolver,
            assets,
            cdn_base_url: cdn_base_url.trim_end_matches('/'),
        }
    }

    pub fn resolver(&self) -> &'a dyn EntityResolver {
        self.resolver
    }

    pub fn assets(&self) -> &'a AssetCache {
        self.assets
    }

    pub fn cdn_base_url(&self) -> &'a str {
        self.cdn_base_url
    }

    /// Render a message field (body, embed title, field value, ...).
    pub async fn render(&self, text: &str) -> Result<String> {
        self.render_nested(text, Mode::Document).await
    }

    /// Render a single-line fragment: no headers, quotes or lists.
    pub async fn render_inline(&self, text: &str) -> Result<String> {
        self.render_nested(text, Mode::Inline).await
    }

    fn render_nested<'s>(&'s self, text: &'s str, mode: Mode) -> RenderFuture<'s> {
        Box::pin(async move {
            let tokens = tokenize_with(text, mode);
            self.render_tokens(&tokens).await
        })
    }

    async fn render_tokens(&self, tokens: &[Token]) -> Result<String> {
        let mut html = String::new();
        let mut in_list = false;

        for token in tokens {
            let is_item = token.kind == TokenKind::UnorderedListItem;
            if in_list && !is_item {
                html.push_str("</ul>");
                in_list = false;
            }

            match token.kind {
                TokenKind::Header1 | TokenKind::Header2 | TokenKind::Header3 => {
                    let tag = match token.kind {
                        TokenKind::Header1 => "h1",
                        TokenKind::Header2 => "h2",
                        _ => "h3",
                    };
                    let inner = self.render_nested(&token.value, Mode::Inline).await?;
                    html.push_str(&format!("<{tag}>{inner}</{tag}>"));
                }
                TokenKind::AtUser => {
                    let name = token
                        .snowflake()
                        .and_then(|id| self.resolver.resolve_user(id))
                        .unwrap_or_else(|| UNKNOWN_USER.to_string());
                    html.push_str(&format!(
                        r#"<span class="mention">@{}</span>"#,
                        escape_html(&name)
                    ));
                }
                TokenKind::AtRole => {
                    let name = token
                        .snowflake()
                        .and_then(|id| self.resolver.resolve_role(id))
                        .unwrap_or_else(|| UNKNOWN_ROLE.to_string());
                    html.push_str(&format!(
                        r#"<span class="mention role">@{}</span>"#,
                        escape_html(&name)
                    ));
                }
                TokenKind::ChannelLink => {
                    let name = token
                        .snowflake()
                        .and_then(|id| self.resolver.resolve_channel(id))
                        .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string());
                    html.push_str(&format!(
                        r#"<span class="mention channel">#{}</span>"#,
                        escape_html(&name)
                    ));
                }
                TokenKind::Emoji => html.push_str(&self.render_emoji(token).await?),
                TokenKind::CodeBlock => html.push_str(&format!(
                    r#"<div class="codeBlock"><code>{}</code></div>"#,
                    newline_to_break(&escape_html(&token.value))
                )),
                TokenKind::CodeText => html.push_str(&format!(
                    r#"<span class="codeText">{}</span>"#,
                    newline_to_break(&escape_html(&token.value))
                )),
                TokenKind::Text => {
                    html.push_str(&newline_to_break(&inline_markdown(&escape_html(
                        &token.value,
                    ))))
                }
                TokenKind::Link => {
                    let url = escape_html(&token.value);
                    html.push_str(&format!(r#"<a href="{url}">{url}</a>"#));
                }
                TokenKind::MaskedLink => match token.masked_parts() {
                    Some((text, url)) if is_web_url(url) => {
                        let inner = self.render_nested(text, Mode::Inline).await?;
                        html.push_str(&format!(
                            r#"<a href="{}">{}</a>"#,
                            escape_html(url),
                            inner
                        ));
                    }
                    _ => html.push_str(&escape_html(&token.value)),
                },
                TokenKind::Blockquote => {
                    let mode = if token.is_multiline_quote() {
                        Mode::Quoted
                    } else {
                        Mode::Inline
                    };
                    let inner = self.render_nested(&token.value, mode).await?;
                    html.push_str(&format!("<blockquote>{inner}</blockquote>"));
                }
                TokenKind::UnorderedListItem => {
                    if !in_list {
                        html.push_str("<ul>");
                        in_list = true;
                    }
                    let inner = self.render_nested(&token.value, Mode::Inline).await?;
                    html.push_str(&format!("<li>{inner}</li>"));
                }
            }
        }

        if in_list {
            html.push_str("</ul>");
        }
        Ok(html)
    }

    async fn render_emoji(&self, token: &Token) -> Result<String> {
        let Some(parts) = token.emoji_parts() else {
            return Ok(escape_html(&token.value));
        };
        let src = self.custom_emoji_src(parts.id, parts.animated).await?;
        Ok(match src {
            Some(src) => format!(
                r#"<img class="emoji" src="{}" alt=":{name}:" title=":{name}:">"#,
                src,
                name = escape_html(parts.name)
            ),
            None => escape_html(&token.value),
        })
    }

    /// Local image path for a custom emoji, `None` if it could not be downloaded.
    ///
    /// Emoji from this guild come from the resolver; anything else is tried
    /// at its direct CDN address.
    pub async fn custom_emoji_src(&self, id: u64, animated: bool) -> Result<Option<String>> {
        let ext = if animated { "gif" } else { "png" };
        let direct = format!("{}/emojis/{}.{}", self.cdn_base_url, id, ext);
        let asset_id = id.to_string();
        let asset = match self.resolver.resolve_emoji(id) {
            Some(emoji) => self.assets.fetch(&asset_id, &emoji.url, Some(&direct)).await?,
            None => self.assets.fetch(&asset_id, &direct, None).await?,
        };
        Ok(asset.available.then_some(asset.relative_path))
    }
}
