//! Discord REST client.
//!
//! Reads history, threads and the guild directory, and posts archives back.
//! Every request goes through [`call_with_backoff`], which honours 429
//! `Retry-After` and retries transient server errors.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use chronicle_core::{
    ArchiveDelivery, ChannelSource, Directory, DiscordConfig, Message, Snowflake, Thread,
};

use crate::wire::{
    WireChannel, WireEmoji, WireMember, WireMessage, WireRole, WireThreadList,
};

const PROVIDER: &str = "discord";
const MESSAGE_PAGE: usize = 100;
const MEMBER_PAGE: usize = 1000;
const THREAD_PAGE: usize = 100;
const USER_AGENT: &str = concat!("DiscordBot (chronicle, ", env!("CARGO_PKG_VERSION"), ")");

/// The requested object does not exist (HTTP 404).
#[derive(Debug, Error)]
#[error("{0}: not found (404)")]
pub struct NotFound(String);

/// Send a request, retrying on rate limits and server errors.
///
/// `builder_fn` is called once per attempt, since a sent request cannot be
/// replayed.
pub async fn call_with_backoff<F>(provider: &str, mut builder_fn: F) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut retries = 0;
    let mut delay = Duration::from_secs(1);
    let max_retries = 8;

    loop {
        let response = builder_fn().send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status.as_u16() == 429 {
            if retries >= max_retries {
                return Err(anyhow!("{}: Rate limited after {} retries", provider, retries));
            }

            // Discord sends fractional seconds.
            let wait = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(delay);

            warn!("{}: Rate limited, waiting {:?}", provider, wait);
            sleep(wait).await;

            retries += 1;
            delay = std::cmp::min(delay * 2, Duration::from_secs(60));
            continue;
        }

        if status.is_server_error() && retries < 3 {
            warn!("{}: Server error {}, retrying...", provider, status);
            sleep(delay).await;
            retries += 1;
            delay *= 2;
            continue;
        }

        if status.as_u16() == 404 {
            return Err(NotFound(provider.to_string()).into());
        }

        if status.as_u16() == 403 {
            return Err(anyhow!("{}: Access forbidden (403). Check permissions.", provider));
        }

        return Err(anyhow!(
            "{}: HTTP {} - {}",
            provider,
            status,
            response.text().await.unwrap_or_default()
        ));
    }
}

pub struct DiscordClient {
    http: reqwest::Client,
    api_base_url: String,
    cdn_base_url: String,
    token: String,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_http(
            http,
            &config.api_base_url,
            &config.cdn_base_url,
            token,
        ))
    }

    pub fn with_http(
        http: reqwest::Client,
        api_base_url: &str,
        cdn_base_url: &str,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            cdn_base_url: cdn_base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Shared HTTP client, reused for asset downloads.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn cdn_base_url(&self) -> &str {
        &self.cdn_base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        let response = call_with_backoff(PROVIDER, || {
            self.http
                .get(&url)
                .header("Authorization", format!("Bot {}", self.token))
                .query(params)
        })
        .await
        .with_context(|| format!("GET {}", path))?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to decode response of {}", path))
    }

    async fn guild_of(&self, channel_id: Snowflake) -> Result<Snowflake> {
        let channel: WireChannel = self.get_json(&format!("/channels/{}", channel_id), &[]).await?;
        channel
            .guild_id
            .with_context(|| format!("Channel {} is not in a guild", channel_id))
    }

    async fn list_archived(
        &self,
        channel_id: Snowflake,
        visibility: &str,
    ) -> Result<Vec<Thread>> {
        let path = format!("/channels/{}/threads/archived/{}", channel_id, visibility);
        let mut threads = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let mut params = vec![("limit", THREAD_PAGE.to_string())];
            if let Some(b) = before.as_ref() {
                params.push(("before", b.clone()));
            }
            let page: WireThreadList = self.get_json(&path, &params).await?;

            before = page
                .threads
                .last()
                .and_then(|t| t.thread_metadata.as_ref())
                .and_then(|m| m.archive_timestamp.clone());
            threads.extend(page.threads.into_iter().map(|t| t.into_thread(channel_id)));

            if !page.has_more || before.is_none() {
                break;
            }
        }

        Ok(threads)
    }

    async fn load_members(&self, guild_id: Snowflake) -> Result<Vec<WireMember>> {
        let path = format!("/guilds/{}/members", guild_id);
        let mut members: Vec<WireMember> = Vec::new();
        let mut after: Option<Snowflake> = None;

        loop {
            let mut params = vec![("limit", MEMBER_PAGE.to_string())];
            if let Some(a) = after {
                params.push(("after", a.to_string()));
            }
            let page: Vec<WireMember> = self.get_json(&path, &params).await?;
            let count = page.len();
            after = page.last().map(|m| m.user.id);
            members.extend(page);

            if count < MEMBER_PAGE || after.is_none() {
                break;
            }
        }

        Ok(members)
    }

    async fn post_message(&self, channel_id: Snowflake, form: impl Fn() -> RequestBody) -> Result<()> {
        let url = self.url(&format!("/channels/{}/messages", channel_id));
        call_with_backoff(PROVIDER, || {
            let request = self
                .http
                .post(&url)
                .header("Authorization", format!("Bot {}", self.token));
            match form() {
                RequestBody::Json(body) => request.json(&body),
                RequestBody::Multipart(form) => request.multipart(form),
            }
        })
        .await
        .with_context(|| format!("POST to channel {}", channel_id))?;
        Ok(())
    }
}

enum RequestBody {
    Json(serde_json::Value),
    Multipart(Form),
}

#[async_trait]
impl ChannelSource for DiscordClient {
    async fn list_messages(&self, channel_id: Snowflake) -> Result<Vec<Message>> {
        let path = format!("/channels/{}/messages", channel_id);
        let mut messages: Vec<Message> = Vec::new();
        let mut before: Option<Snowflake> = None;

        loop {
            let mut params = vec![("limit", MESSAGE_PAGE.to_string())];
            if let Some(b) = before {
                params.push(("before", b.to_string()));
            }
            let page: Vec<WireMessage> = self.get_json(&path, &params).await?;
            let count = page.len();
            debug!("Channel {}: fetched page of {} messages", channel_id, count);

            messages.extend(page.into_iter().map(|m| m.into_message(&self.cdn_base_url)));
            before = messages.last().map(|m| m.id);

            if count < MESSAGE_PAGE {
                break;
            }
        }

        info!("Channel {}: {} messages fetched", channel_id, messages.len());
        Ok(messages)
    }

    async fn list_active_threads(&self, channel_id: Snowflake) -> Result<Vec<Thread>> {
        let guild_id = self.guild_of(channel_id).await?;
        let list: WireThreadList = self
            .get_json(&format!("/guilds/{}/threads/active", guild_id), &[])
            .await?;
        Ok(list
            .threads
            .into_iter()
            .filter(|t| t.parent_id == Some(channel_id))
            .map(|t| t.into_thread(channel_id))
            .collect())
    }

    async fn list_archived_threads(&self, channel_id: Snowflake) -> Result<Vec<Thread>> {
        let mut threads = self.list_archived(channel_id, "public").await?;
        // Private archived threads need MANAGE_THREADS; their absence is not fatal.
        match self.list_archived(channel_id, "private").await {
            Ok(private) => threads.extend(private),
            Err(err) => warn!("Private archived threads of {} skipped: {:#}", channel_id, err),
        }
        Ok(threads)
    }

    async fn fetch_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<Option<Message>> {
        let path = format!("/channels/{}/messages/{}", channel_id, message_id);
        match self.get_json::<WireMessage>(&path, &[]).await {
            Ok(message) => Ok(Some(message.into_message(&self.cdn_base_url))),
            Err(err) if err.downcast_ref::<NotFound>().is_some() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn load_directory(&self, channel_id: Snowflake) -> Result<Directory> {
        let guild_id = self.guild_of(channel_id).await?;
        let mut directory = Directory::new();

        let roles: Vec<WireRole> = self
            .get_json(&format!("/guilds/{}/roles", guild_id), &[])
            .await?;
        for role in &roles {
            directory.insert_role(role.id, role.name.clone());
        }
        let role_index: HashMap<Snowflake, &WireRole> = roles.iter().map(|r| (r.id, r)).collect();

        // Listing members needs the privileged members intent. Without it,
        // names still come from message authors.
        match self.load_members(guild_id).await {
            Ok(members) => {
                for member in &members {
                    directory.insert_user(member.user.id, member.display_name());
                    let color = member
                        .roles
                        .iter()
                        .filter_map(|id| role_index.get(id))
                        .filter(|r| r.color != 0)
                        .max_by_key(|r| r.position)
                        .map(|r| r.color);
                    if let Some(color) = color {
                        directory.insert_user_color(member.user.id, color);
                    }
                }
            }
            Err(err) => warn!("Guild {} members unavailable: {:#}", guild_id, err),
        }

        let channels: Vec<WireChannel> = self
            .get_json(&format!("/guilds/{}/channels", guild_id), &[])
            .await?;
        for channel in channels {
            if let Some(name) = channel.name {
                directory.insert_channel(channel.id, name);
            }
        }

        let emojis: Vec<WireEmoji> = self
            .get_json(&format!("/guilds/{}/emojis", guild_id), &[])
            .await?;
        for emoji in emojis {
            if let Some(id) = emoji.id {
                let ext = if emoji.animated { "gif" } else { "png" };
                directory.insert_emoji(id, format!("{}/emojis/{}.{}", self.cdn_base_url, id, ext));
            }
        }

        info!(
            "Guild {}: {} users, {} roles in directory",
            guild_id,
            directory.user_count(),
            roles.len()
        );
        Ok(directory)
    }
}

#[async_trait]
impl ArchiveDelivery for DiscordClient {
    async fn send_message(&self, channel_id: Snowflake, content: &str) -> Result<()> {
        self.post_message(channel_id, || {
            RequestBody::Json(serde_json::json!({ "content": content }))
        })
        .await
    }

    async fn upload_file(&self, channel_id: Snowflake, path: &Path, label: &str) -> Result<()> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.zip".to_string());
        let payload = serde_json::json!({
            "content": label,
            "attachments": [{ "id": 0, "filename": filename }],
        })
        .to_string();

        info!("Uploading {} ({} bytes) to {}", filename, bytes.len(), channel_id);
        self.post_message(channel_id, || {
            let file = Part::bytes(bytes.clone()).file_name(filename.clone());
            RequestBody::Multipart(
                Form::new()
                    .text("payload_json", payload.clone())
                    .part("files[0]", file),
            )
        })
        .await
    }
}
