use std::path::{Path, PathBuf};

use anyhow::Result;

use super::Session;

pub async fn run(
    config_path: &Path,
    channel: u64,
    message: u64,
    output: Option<PathBuf>,
) -> Result<()> {
    let session = Session::open(config_path, output)?;
    let path = session.exporter.export_message(channel, message).await?;
    println!("{}", path.display());
    Ok(())
}
