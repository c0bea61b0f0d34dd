//! Configuration schema and loading.
//!
//! Chronicle is configured via a TOML file (default `chronicle.toml`). Every
//! key has a default, so a missing file or a partial one is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::queue::QueueOrder;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "chronicle.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChronicleConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Environment variable holding the bot token.
    pub token_env: String,
    pub api_base_url: String,
    pub cdn_base_url: String,
    pub http_timeout_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token_env: "CHRONICLE_DISCORD_TOKEN".to_string(),
            api_base_url: "https://discord.com/api/v10".to_string(),
            cdn_base_url: "https://cdn.discordapp.com".to_string(),
            http_timeout_secs: 30,
        }
    }
}

impl DiscordConfig {
    /// Read the bot token from the configured environment variable.
    pub fn token(&self) -> Result<String> {
        let token = std::env::var(&self.token_env)
            .with_context(|| format!("Bot token not set: export {}", self.token_env))?;
        let token = token.trim().to_string();
        if token.is_empty() {
            anyhow::bail!("Bot token in {} is empty", self.token_env);
        }
        Ok(token)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Root under which each channel gets `<channel_id>/`.
    pub output_dir: PathBuf,
    /// Upper bound for one shard, in uncompressed bytes. The default leaves
    /// headroom under a 25 MB upload limit.
    pub max_shard_bytes: u64,
    pub tick_interval_ms: u64,
    pub queue_order: QueueOrder,
    /// HTML shell replacing the bundled one. Must contain `{body}`.
    pub template_path: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            max_shard_bytes: 24_000_000,
            tick_interval_ms: 1000,
            queue_order: QueueOrder::Fifo,
            template_path: None,
        }
    }
}

impl ExportConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl ChronicleConfig {
    /// Load configuration from a TOML file, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ChronicleConfig::default();
        assert_eq!(config.discord.token_env, "CHRONICLE_DISCORD_TOKEN");
        assert_eq!(config.discord.api_base_url, "https://discord.com/api/v10");
        assert_eq!(config.export.output_dir, PathBuf::from("output"));
        assert_eq!(config.export.max_shard_bytes, 24_000_000);
        assert_eq!(config.export.queue_order, QueueOrder::Fifo);
        assert_eq!(config.export.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
[export]
output_dir = "/srv/archives"
queue_order = "lifo"
"#;
        let config: ChronicleConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.export.output_dir, PathBuf::from("/srv/archives"));
        assert_eq!(config.export.queue_order, QueueOrder::Lifo);
        assert_eq!(config.export.max_shard_bytes, 24_000_000);
        assert_eq!(config.discord.cdn_base_url, "https://cdn.discordapp.com");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ChronicleConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.discord.http_timeout_secs, 30);
    }

    #[test]
    fn test_load_rejects_bad_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chronicle.toml");
        std::fs::write(&path, "[export]\nqueue_order = \"random\"\n").unwrap();
        let err = ChronicleConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_token_from_env() {
        let config = DiscordConfig {
            token_env: "CHRONICLE_TEST_TOKEN_FROM_ENV".to_string(),
            ..DiscordConfig::default()
        };
        assert!(config.token().is_err());
        std::env::set_var("CHRONICLE_TEST_TOKEN_FROM_ENV", " abc.def \n");
        assert_eq!(config.token().unwrap(), "abc.def");
        std::env::remove_var("CHRONICLE_TEST_TOKEN_FROM_ENV");
    }
}
