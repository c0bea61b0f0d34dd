pub mod debug;
pub mod export;
pub mod tokens;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use chronicle_core::{ChannelExporter, ChronicleConfig, DocumentTemplate};
use chronicle_discord::DiscordClient;

/// Effective config and an exporter wired to Discord.
pub struct Session {
    pub config: ChronicleConfig,
    pub exporter: ChannelExporter,
}

impl Session {
    pub fn open(config_path: &Path, output: Option<PathBuf>) -> Result<Self> {
        let mut config = ChronicleConfig::load(config_path)?;
        if let Some(output) = output {
            config.export.output_dir = output;
        }
        info!("Writing exports under {}", config.export.output_dir.display());

        let token = config.discord.token()?;
        let client = Arc::new(DiscordClient::new(&config.discord, token)?);
        let template = DocumentTemplate::load(config.export.template_path.as_deref())?;

        let exporter = ChannelExporter::new(
            client.clone(),
            client.http().clone(),
            template,
            &config.export,
            client.cdn_base_url(),
        )
        .with_delivery(client);

        Ok(Self { config, exporter })
    }
}
