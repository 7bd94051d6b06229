//! Background job queue executing pipeline tasks.
//!
//! Tasks are enqueued fire-and-forget; a processor loop pulls them off an
//! unbounded channel, acquires a permit from the concurrency limiter and
//! spawns the task with a hard wall-clock timeout. Shutdown is cooperative:
//! the cancellation token stops the processor, which then waits for every
//! in-flight task to release its permit.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::pipeline::{TaskContext, run_task};
use crate::types::{FinishCode, TaskKind};

/// Handle to the background task processor
pub struct JobQueue {
    tx: mpsc::UnboundedSender<TaskKind>,
    cancel: CancellationToken,
    processor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl JobQueue {
    /// Start the processor loop with the given pipeline context
    pub fn start(ctx: TaskContext, config: &QueueConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let processor = tokio::spawn(process_loop(
            ctx,
            rx,
            cancel.clone(),
            config.max_concurrent_tasks,
            config.task_timeout,
        ));

        Self {
            tx,
            cancel,
            processor: Mutex::new(Some(processor)),
        }
    }

    /// Submit a task for execution
    ///
    /// Returns [`Error::ShuttingDown`] once the queue has been shut down;
    /// accepted tasks run at some later point under the concurrency limit.
    pub fn enqueue(&self, task: TaskKind) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        tracing::info!(task = task.name(), "Task enqueued");
        self.tx.send(task).map_err(|_| Error::ShuttingDown)
    }

    /// Stop accepting work and wait for in-flight tasks to finish
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = {
            let mut processor = self.processor.lock().unwrap_or_else(|e| e.into_inner());
            processor.take()
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Queue processor terminated abnormally");
            }
        }
        tracing::info!("Job queue stopped");
    }
}

async fn process_loop(
    ctx: TaskContext,
    mut rx: mpsc::UnboundedReceiver<TaskKind>,
    cancel: CancellationToken,
    max_concurrent: usize,
    task_timeout: Duration,
) {
    let limit = Arc::new(Semaphore::new(max_concurrent));

    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        // Blocks while the pool is saturated; shutdown interrupts the wait
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let task_ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let name = task.name();
            match tokio::time::timeout(task_timeout, run_task(&task_ctx, &task)).await {
                Ok(code) => {
                    tracing::debug!(task = name, code = ?code, "Task completed");
                }
                Err(_) => {
                    // Counts as a task failure at the queue level
                    tracing::error!(
                        task = name,
                        timeout_secs = task_timeout.as_secs(),
                        code = ?FinishCode::Error,
                        "Task exceeded its wall-clock timeout"
                    );
                }
            }
        });
    }

    // Drain: wait for every in-flight task to hand its permit back
    let _ = limit.acquire_many_owned(max_concurrent as u32).await;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_helpers::{seed_episode, seed_podcast, test_context};
    use crate::types::SourceType;
    use std::time::Instant;

    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within the deadline");
    }

    #[tokio::test]
    async fn enqueued_task_runs_to_completion() {
        let t = test_context().await;
        let podcast_id = seed_podcast(&t.ctx.db, "pub-1").await;
        let queue = JobQueue::start(t.ctx.clone(), &QueueConfig::default());

        queue
            .enqueue(TaskKind::RegenerateRss {
                podcast_ids: vec![podcast_id],
            })
            .unwrap();

        let db = t.ctx.db.clone();
        wait_until(|| {
            let db = db.clone();
            async move {
                db.get_podcast_required(podcast_id)
                    .await
                    .unwrap()
                    .rss_file_id
                    .is_some()
            }
        })
        .await;
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn several_tasks_all_complete() {
        let t = test_context().await;
        let podcast_id = seed_podcast(&t.ctx.db, "pub-1").await;
        let first = seed_episode(&t.ctx.db, podcast_id, "aaaaaaaaaaa", SourceType::Youtube).await;
        let second = seed_episode(&t.ctx.db, podcast_id, "bbbbbbbbbbb", SourceType::Youtube).await;
        let queue = JobQueue::start(t.ctx.clone(), &QueueConfig::default());

        for episode_id in [first, second] {
            queue
                .enqueue(TaskKind::FetchEpisodeCover {
                    episode_id: Some(episode_id),
                })
                .unwrap();
        }

        let db = t.ctx.db.clone();
        wait_until(|| {
            let db = db.clone();
            async move {
                for episode_id in [first, second] {
                    let episode = db.get_episode_required(episode_id).await.unwrap();
                    let image = db.get_file_required(episode.image_file_id).await.unwrap();
                    if !image.available {
                        return false;
                    }
                }
                true
            }
        })
        .await;
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_rejected() {
        let t = test_context().await;
        let queue = JobQueue::start(t.ctx.clone(), &QueueConfig::default());
        queue.shutdown().await;

        let err = queue
            .enqueue(TaskKind::RegenerateRss { podcast_ids: vec![] })
            .unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
    }
}
