use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use chronicle_core::{ExportJob, ExportQueue, ExportWorker};

use super::Session;

pub async fn run(
    config_path: &Path,
    channels: Vec<u64>,
    destination: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let session = Session::open(config_path, output)?;
    let tick = session.config.export.tick_interval();
    let queue = Arc::new(ExportQueue::new(session.config.export.queue_order));

    for channel in channels {
        queue.enqueue(ExportJob::new(channel, destination));
    }

    let worker = ExportWorker::new(queue.clone(), session.exporter, tick);
    worker.run_until_idle().await;

    info!("All queued exports processed");
    Ok(())
}
