//! End-to-end channel export.
//!
//! create dirs → directory snapshot → threads → history → compose →
//! documents → package → optional delivery.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::assets::AssetCache;
use crate::compose::MessageComposer;
use crate::config::ExportConfig;
use crate::model::{ExportJob, Message, Snowflake, Thread};
use crate::packager::{ArchivePackager, ArchiveShard};
use crate::queue::JobRunner;
use crate::render::{escape_html, Renderer};
use crate::source::{ArchiveDelivery, ChannelSource, Directory};
use crate::threads::{thread_document_name, ThreadIndex, INDEX_DOCUMENT};

/// Bundled HTML shell.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/export_doc.html");
pub const BODY_PLACEHOLDER: &str = "{body}";
/// Directory (under the output root) for single-message debug renders.
pub const DEBUG_DIR: &str = "debug";

#[derive(Debug, Clone)]
pub struct DocumentTemplate {
    html: String,
}

impl DocumentTemplate {
    pub fn bundled() -> Self {
        Self {
            html: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// The template at `path`, or the bundled one when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::bundled());
        };
        let html = fs::read_to_string(path)
            .with_context(|| format!("Failed to read template: {}", path.display()))?;
        Self::from_html(html)
            .with_context(|| format!("Invalid template: {}", path.display()))
    }

    pub fn from_html(html: impl Into<String>) -> Result<Self> {
        let html = html.into();
        if !html.contains(BODY_PLACEHOLDER) {
            anyhow::bail!("Template has no {} placeholder", BODY_PLACEHOLDER);
        }
        Ok(Self { html })
    }

    pub fn fill(&self, body: &str) -> String {
        self.html.replacen(BODY_PLACEHOLDER, body, 1)
    }
}

/// Outcome of one channel export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub channel_id: Snowflake,
    pub export_dir: PathBuf,
    pub message_count: usize,
    /// `index.html` first, then thread documents in ascending ID order.
    pub documents: Vec<PathBuf>,
    pub shards: Vec<ArchiveShard>,
    /// Whether every shard reached the destination. False when there was no
    /// destination.
    pub delivered: bool,
}

pub struct ChannelExporter {
    source: Arc<dyn ChannelSource>,
    delivery: Option<Arc<dyn ArchiveDelivery>>,
    http: reqwest::Client,
    template: DocumentTemplate,
    output_root: PathBuf,
    cdn_base_url: String,
    max_shard_bytes: u64,
}

impl ChannelExporter {
    pub fn new(
        source: Arc<dyn ChannelSource>,
        http: reqwest::Client,
        template: DocumentTemplate,
        config: &ExportConfig,
        cdn_base_url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            delivery: None,
            http,
            template,
            output_root: config.output_dir.clone(),
            cdn_base_url: cdn_base_url.into(),
            max_shard_bytes: config.max_shard_bytes,
        }
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn ArchiveDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn export_dir(&self, channel_id: Snowflake) -> PathBuf {
        self.output_root.join(channel_id.to_string())
    }

    /// Run the whole pipeline for one job.
    ///
    /// Filesystem and history failures abort the job. Asset and delivery
    /// failures are logged and the export still completes.
    pub async fn export(&self, job: ExportJob) -> Result<ExportReport> {
        let channel_id = job.source_channel_id;
        let export_dir = self.export_dir(channel_id);
        fs::create_dir_all(&export_dir)
            .with_context(|| format!("Failed to create {}", export_dir.display()))?;
        let assets = AssetCache::new(&export_dir, self.http.clone());
        assets.ensure_dir()?;

        let mut directory = self
            .source
            .load_directory(channel_id)
            .await
            .with_context(|| format!("Failed to load directory for channel {}", channel_id))?;
        info!("Channel {}: directory has {} users", channel_id, directory.user_count());

        let threads = ThreadIndex::discover(self.source.as_ref(), channel_id).await?;
        let messages = self.fetch_ascending(channel_id).await?;
        remember_authors(&mut directory, &messages);

        let mut documents = Vec::new();
        {
            let renderer = Renderer::new(&directory, &assets, &self.cdn_base_url);
            let body = MessageComposer::new(&renderer, self.source.as_ref(), &threads)
                .compose(&messages)
                .await?;
            documents.push(self.write_document(&export_dir, INDEX_DOCUMENT, &body)?);
        }

        // Platform threads cannot nest, so thread documents link nowhere.
        let no_threads = ThreadIndex::default();
        for thread in threads.sorted() {
            let body = match self.fetch_ascending(thread.id).await {
                Ok(history) => {
                    remember_authors(&mut directory, &history);
                    let renderer = Renderer::new(&directory, &assets, &self.cdn_base_url);
                    MessageComposer::new(&renderer, self.source.as_ref(), &no_threads)
                        .compose(&history)
                        .await?
                }
                Err(err) => {
                    // The parent document already links here.
                    warn!("Thread {} ({}) history unavailable: {:#}", thread.id, thread.name, err);
                    unavailable_thread_body(thread)
                }
            };
            let name = thread_document_name(thread.id);
            documents.push(self.write_document(&export_dir, &name, &body)?);
        }
        info!(
            "Channel {}: wrote {} documents for {} messages",
            channel_id,
            documents.len(),
            messages.len()
        );

        let shards = self.package(&export_dir, channel_id, &documents).await?;

        let delivered = match (job.destination_channel_id, &self.delivery) {
            (Some(destination), Some(delivery)) => {
                deliver(delivery.as_ref(), destination, channel_id, &shards).await
            }
            (Some(destination), None) => {
                warn!("No delivery configured; not posting to {}", destination);
                false
            }
            (None, _) => false,
        };

        Ok(ExportReport {
            channel_id,
            export_dir,
            message_count: messages.len(),
            documents,
            shards,
            delivered,
        })
    }

    /// Render one message into `<output>/debug/index.html`.
    pub async fn export_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<PathBuf> {
        let debug_dir = self.output_root.join(DEBUG_DIR);
        fs::create_dir_all(&debug_dir)
            .with_context(|| format!("Failed to create {}", debug_dir.display()))?;
        let assets = AssetCache::new(&debug_dir, self.http.clone());
        assets.ensure_dir()?;

        let message = self
            .source
            .fetch_message(channel_id, message_id)
            .await?
            .with_context(|| format!("Message {} not found in channel {}", message_id, channel_id))?;
        let mut directory = self.source.load_directory(channel_id).await?;
        remember_authors(&mut directory, std::slice::from_ref(&message));

        let renderer = Renderer::new(&directory, &assets, &self.cdn_base_url);
        let threads = ThreadIndex::default();
        let html = MessageComposer::new(&renderer, self.source.as_ref(), &threads)
            .compose_message(&message, false, &HashMap::new())
            .await?;

        self.write_document(&debug_dir, INDEX_DOCUMENT, &html)
    }

    async fn fetch_ascending(&self, channel_id: Snowflake) -> Result<Vec<Message>> {
        let mut messages = self
            .source
            .list_messages(channel_id)
            .await
            .with_context(|| format!("Failed to fetch history of {}", channel_id))?;
        messages.reverse();
        Ok(messages)
    }

    fn write_document(&self, dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, self.template.fill(body))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    async fn package(
        &self,
        export_dir: &Path,
        channel_id: Snowflake,
        documents: &[PathBuf],
    ) -> Result<Vec<ArchiveShard>> {
        let packager = ArchivePackager::new(self.max_shard_bytes);
        let dir = export_dir.to_path_buf();
        let documents = documents.to_vec();
        let prefix = channel_id.to_string();

        let shards = tokio::task::spawn_blocking(move || packager.package(&dir, &prefix, &documents))
            .await
            .context("Packaging task panicked")??;
        Ok(shards)
    }
}

#[async_trait]
impl JobRunner for ChannelExporter {
    async fn run(&self, job: ExportJob) -> Result<()> {
        let report = self.export(job).await?;
        info!(
            "Exported {} to {} ({} shard(s), delivered: {})",
            report.channel_id,
            report.export_dir.display(),
            report.shards.len(),
            report.delivered
        );
        Ok(())
    }
}

fn unavailable_thread_body(thread: &Thread) -> String {
    format!(
        r#"<div class="messageBlock mt-20 system"><div class="content"><span class="systemMessage">History of thread {} could not be loaded.</span></div></div>"#,
        escape_html(&thread.name)
    )
}

fn remember_authors(directory: &mut Directory, messages: &[Message]) {
    for message in messages {
        directory.remember_user(message.author.id, &message.author.name);
    }
}

/// Announce, then upload every shard in index order. A failure is reported
/// as one message to the destination and never propagated.
async fn deliver(
    delivery: &dyn ArchiveDelivery,
    destination: Snowflake,
    channel_id: Snowflake,
    shards: &[ArchiveShard],
) -> bool {
    match upload_shards(delivery, destination, channel_id, shards).await {
        Ok(()) => {
            info!("Delivered {} shard(s) to {}", shards.len(), destination);
            true
        }
        Err(err) => {
            error!("Delivery of {} to {} failed: {:#}", channel_id, destination, err);
            let notice = format!("Backup of <#{}> could not be uploaded: {}", channel_id, err);
            if let Err(notify_err) = delivery.send_message(destination, &notice).await {
                warn!("Failure notice to {} also failed: {:#}", destination, notify_err);
            }
            false
        }
    }
}

async fn upload_shards(
    delivery: &dyn ArchiveDelivery,
    destination: Snowflake,
    channel_id: Snowflake,
    shards: &[ArchiveShard],
) -> Result<()> {
    let total = shards.len();
    let announcement = format!(
        "Backup of <#{}> completed. {} archive file(s) will be posted below.",
        channel_id, total
    );
    delivery.send_message(destination, &announcement).await?;

    for shard in shards {
        let label = format!("Part {} of {}", shard.index + 1, total);
        delivery
            .upload_file(destination, &shard.path, &label)
            .await
            .with_context(|| format!("Failed to upload {}", shard.path.display()))?;
    }
    Ok(())
}
