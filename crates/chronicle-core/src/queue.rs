//! Single-slot export queue.
//!
//! Export requests pile up in `pending`; a worker ticks at a fixed interval
//! and, when nothing is running, moves the next job into the `current` slot
//! and runs it. Exports hit rate-limited APIs and write large directories, so
//! at most one runs at a time no matter how many workers poll the queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::model::ExportJob;

/// Which pending job is taken next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Oldest request first.
    #[default]
    Fifo,
    /// Newest request first.
    Lifo,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<ExportJob>,
    current: Option<ExportJob>,
}

/// Pending jobs plus the one in-flight slot, behind a single lock.
#[derive(Debug, Default)]
pub struct ExportQueue {
    order: QueueOrder,
    state: Mutex<QueueState>,
}

impl ExportQueue {
    pub fn new(order: QueueOrder) -> Self {
        Self {
            order,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn order(&self) -> QueueOrder {
        self.order
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // A panicking job never holds this lock, so poisoning carries no
        // half-written state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, job: ExportJob) {
        let mut state = self.state();
        state.pending.push_back(job);
        info!(
            "[QUEUE] Queued export of {} ({} pending)",
            job.source_channel_id,
            state.pending.len()
        );
    }

    /// Claim the next job if the slot is free.
    ///
    /// Returns None when a job is already running or nothing is pending.
    pub fn try_begin(&self) -> Option<ExportJob> {
        let mut state = self.state();
        if state.current.is_some() {
            return None;
        }
        let job = match self.order {
            QueueOrder::Fifo => state.pending.pop_front(),
            QueueOrder::Lifo => state.pending.pop_back(),
        }?;
        state.current = Some(job);
        Some(job)
    }

    /// Like [`try_begin`](Self::try_begin), but the slot is released when the
    /// returned guard drops, including during a panic.
    pub fn begin(&self) -> Option<SlotGuard<'_>> {
        self.try_begin().map(|job| SlotGuard { queue: self, job })
    }

    /// Release the slot.
    pub fn finish(&self) {
        self.state().current = None;
    }

    pub fn current(&self) -> Option<ExportJob> {
        self.state().current
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// True when nothing is pending and nothing is running.
    pub fn is_idle(&self) -> bool {
        let state = self.state();
        state.pending.is_empty() && state.current.is_none()
    }
}

/// Holds the queue's slot for one job.
pub struct SlotGuard<'a> {
    queue: &'a ExportQueue,
    job: ExportJob,
}

impl SlotGuard<'_> {
    pub fn job(&self) -> ExportJob {
        self.job
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.queue.finish();
        debug!("[QUEUE] Released slot for {}", self.job.source_channel_id);
    }
}

/// Executes one export job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: ExportJob) -> Result<()>;
}

#[async_trait]
impl<T: JobRunner + ?Sized> JobRunner for Arc<T> {
    async fn run(&self, job: ExportJob) -> Result<()> {
        self.as_ref().run(job).await
    }
}

/// Polls an [`ExportQueue`] and runs jobs one at a time.
pub struct ExportWorker<R> {
    queue: Arc<ExportQueue>,
    runner: R,
    tick_interval: Duration,
}

impl<R: JobRunner> ExportWorker<R> {
    pub fn new(queue: Arc<ExportQueue>, runner: R, tick_interval: Duration) -> Self {
        Self {
            queue,
            runner,
            tick_interval,
        }
    }

    pub fn queue(&self) -> &Arc<ExportQueue> {
        &self.queue
    }

    /// One scheduling step. Returns true if a job ran (successfully or not).
    ///
    /// A failed job is logged and dropped; it is not retried.
    pub async fn tick(&self) -> bool {
        let Some(slot) = self.queue.begin() else {
            return false;
        };
        let job = slot.job();
        info!("[QUEUE] Starting export of {}", job.source_channel_id);

        match self.runner.run(job).await {
            Ok(()) => info!("[QUEUE] Finished export of {}", job.source_channel_id),
            Err(err) => error!(
                "[QUEUE] Export of {} failed: {:#}",
                job.source_channel_id, err
            ),
        }
        drop(slot);
        true
    }

    /// Tick until the queue is empty and no job is running.
    pub async fn run_until_idle(&self) {
        loop {
            if self.tick().await {
                continue;
            }
            if self.queue.is_idle() {
                break;
            }
            tokio::time::sleep(self.tick_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job(id: u64) -> ExportJob {
        ExportJob::new(id, None)
    }

    #[derive(Default)]
    struct RecordingRunner {
        ran: Mutex<Vec<u64>>,
        fail_on: Option<u64>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, job: ExportJob) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            self.ran.lock().unwrap().push(job.source_channel_id);
            if self.fail_on == Some(job.source_channel_id) {
                anyhow::bail!("channel {} is gone", job.source_channel_id);
            }
            Ok(())
        }
    }

    #[test]
    fn test_fifo_and_lifo_order() {
        let fifo = ExportQueue::new(QueueOrder::Fifo);
        let lifo = ExportQueue::new(QueueOrder::Lifo);
        for id in 1..=3 {
            fifo.enqueue(job(id));
            lifo.enqueue(job(id));
        }

        let mut fifo_seen = Vec::new();
        let mut lifo_seen = Vec::new();
        while let Some(j) = fifo.try_begin() {
            fifo_seen.push(j.source_channel_id);
            fifo.finish();
        }
        while let Some(j) = lifo.try_begin() {
            lifo_seen.push(j.source_channel_id);
            lifo.finish();
        }
        assert_eq!(fifo_seen, vec![1, 2, 3]);
        assert_eq!(lifo_seen, vec![3, 2, 1]);
    }

    #[test]
    fn test_single_slot() {
        let queue = ExportQueue::default();
        queue.enqueue(job(1));
        queue.enqueue(job(2));

        let first = queue.try_begin().unwrap();
        assert_eq!(first.source_channel_id, 1);
        assert!(queue.try_begin().is_none());
        assert_eq!(queue.current(), Some(first));
        assert!(!queue.is_idle());

        queue.finish();
        assert_eq!(queue.try_begin().unwrap().source_channel_id, 2);
    }

    #[test]
    fn test_guard_releases_slot_on_panic() {
        let queue = ExportQueue::default();
        queue.enqueue(job(1));
        queue.enqueue(job(2));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _slot = queue.begin().unwrap();
            panic!("renderer blew up");
        }));

        assert!(result.is_err());
        assert!(queue.current().is_none());
        assert_eq!(queue.try_begin().unwrap().source_channel_id, 2);
    }

    #[tokio::test]
    async fn test_failed_job_releases_slot() {
        let queue = Arc::new(ExportQueue::default());
        for id in [1, 2, 3] {
            queue.enqueue(job(id));
        }
        let runner = RecordingRunner {
            fail_on: Some(2),
            ..Default::default()
        };
        let worker = ExportWorker::new(queue.clone(), runner, Duration::from_millis(1));

        worker.run_until_idle().await;

        assert_eq!(*worker.runner.ran.lock().unwrap(), vec![1, 2, 3]);
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_tick_on_empty_queue() {
        let worker = ExportWorker::new(
            Arc::new(ExportQueue::default()),
            RecordingRunner::default(),
            Duration::from_millis(1),
        );
        assert!(!worker.tick().await);
        worker.run_until_idle().await;
    }

    #[tokio::test]
    async fn test_at_most_one_in_flight_across_workers() {
        let queue = Arc::new(ExportQueue::default());
        for id in 1..=4 {
            queue.enqueue(job(id));
        }
        let runner = Arc::new(RecordingRunner::default());
        let a = ExportWorker::new(queue.clone(), runner.clone(), Duration::from_millis(2));
        let b = ExportWorker::new(queue.clone(), runner.clone(), Duration::from_millis(2));

        tokio::join!(a.run_until_idle(), b.run_until_idle());

        assert_eq!(runner.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(runner.ran.lock().unwrap().len(), 4);
        assert!(queue.is_idle());
    }
}
