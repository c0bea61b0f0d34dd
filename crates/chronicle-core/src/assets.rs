//! Local cache for binary assets referenced by rendered messages.
//!
//! Assets are keyed by platform asset ID. A file already on disk is reused
//! without touching the network, so repeated runs against the same output
//! directory resume instead of re-downloading. The flip side is that an ID
//! reused for different content keeps serving the stale file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Directory (relative to the export root) holding downloaded assets.
pub const ASSETS_DIR: &str = "assets";
/// Suffix of an in-progress download. Only a complete file is renamed to its
/// final name, so an interrupted run never leaves a truncated asset behind.
pub const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsset {
    /// Path to use from a document in the export root, e.g. `./assets/42.png`.
    pub relative_path: String,
    pub local_path: PathBuf,
    /// Whether the file exists on disk. Callers still link the path when
    /// false; browsers show a broken image.
    pub available: bool,
}

pub struct AssetCache {
    assets_dir: PathBuf,
    http: reqwest::Client,
}

impl AssetCache {
    pub fn new(export_dir: &Path, http: reqwest::Client) -> Self {
        Self {
            assets_dir: export_dir.join(ASSETS_DIR),
            http,
        }
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.assets_dir)
            .with_context(|| format!("Failed to create {}", self.assets_dir.display()))
    }

    /// Download `asset_id` once, trying `primary_url` then `fallback_url`.
    ///
    /// Network failures are logged and reported through `available`; only
    /// local filesystem errors are returned.
    pub async fn fetch(
        &self,
        asset_id: &str,
        primary_url: &str,
        fallback_url: Option<&str>,
    ) -> Result<CachedAsset> {
        let filename = format!("{}{}", sanitize_id(asset_id), extension_from_url(primary_url));
        let local_path = self.assets_dir.join(&filename);
        let relative_path = format!("./{}/{}", ASSETS_DIR, filename);

        if local_path.is_file() {
            return Ok(CachedAsset {
                relative_path,
                local_path,
                available: true,
            });
        }

        let mut available = false;
        for url in std::iter::once(primary_url).chain(fallback_url) {
            debug!("Downloading asset {} from {}", asset_id, url);
            match self.download(url).await {
                Ok(bytes) => {
                    let partial = self.assets_dir.join(format!("{}{}", filename, PARTIAL_SUFFIX));
                    fs::write(&partial, &bytes).with_context(|| {
                        format!("Failed to write asset {}", partial.display())
                    })?;
                    fs::rename(&partial, &local_path).with_context(|| {
                        format!("Failed to move asset into {}", local_path.display())
                    })?;
                    available = true;
                    break;
                }
                Err(err) => warn!("Asset {} unavailable at {}: {:#}", asset_id, url, err),
            }
        }

        Ok(CachedAsset {
            relative_path,
            local_path,
            available,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {}", status);
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Extension (with leading dot) of the last path segment of `url`, or empty.
pub fn extension_from_url(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let filename = path.rsplit('/').next().unwrap_or_default();
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext)
        }
        _ => String::new(),
    }
}

/// Stable asset ID for media that carries no platform ID of its own.
pub fn url_asset_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest[..12].iter().map(|b| format!("{:02x}", b)).collect()
}

fn sanitize_id(asset_id: &str) -> String {
    asset_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
