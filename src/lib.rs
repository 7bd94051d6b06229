//! # podcast-dl
//!
//! Backend library for podcast hosting: turns submitted episode sources
//! (YouTube videos, Yandex Music tracks, direct uploads) into published,
//! RSS-served audio.
//!
//! ## Design Philosophy
//!
//! podcast-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Explicitly wired** - Every collaborator is an injected instance,
//!   no global singletons
//! - **Observable** - Byte-level progress is streamed over a pub/sub
//!   channel and an optional WebSocket API
//! - **Crash-tolerant** - Pipelines are idempotent and safe to re-enqueue
//!
//! ## Quick Start
//!
//! ```no_run
//! use podcast_dl::{Config, PodcastDl, TaskKind, EpisodeId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = PodcastDl::new(config).await?;
//!
//!     // Watch progress signals
//!     let mut signals = app.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(raw) = signals.recv().await {
//!             println!("progress: {}", raw);
//!         }
//!     });
//!
//!     app.enqueue(TaskKind::DownloadEpisode {
//!         episode_id: EpisodeId::new(1),
//!     })?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Progress API server (pull endpoints + WebSocket push)
pub mod api;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Episode acquisition pipeline
pub mod pipeline;
/// Progress channel and reporting
pub mod progress;
/// Media providers (yt-dlp wrapper)
pub mod provider;
/// Background job queue
pub mod queue;
/// Retry logic with linear backoff
pub mod retry;
/// Object storage client
pub mod storage;
/// ffmpeg post-processing
pub mod transcode;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{DatabaseError, Error, ProviderError, Result, StorageError, TranscodeError};
pub use pipeline::{TaskContext, run_task};
pub use progress::{ProgressChannel, ProgressTracker};
pub use provider::{MediaProvider, YtDlpProvider, extract_source_info};
pub use queue::JobQueue;
pub use storage::{HttpObjectStorage, ObjectStorage};
pub use transcode::Transcoder;
pub use types::{
    EpisodeId, EpisodeStatus, FinishCode, PodcastId, Progress, ProgressEnvelope, ProgressItem,
    ProgressSignal, ProgressStage, SourceType, TaskKind,
};

/// Podcast download application: queue, pipeline and progress API wired
/// together
///
/// Constructed once and shared; every public method takes `&self`.
pub struct PodcastDl {
    ctx: pipeline::TaskContext,
    channel: ProgressChannel,
    queue: JobQueue,
    cancel: CancellationToken,
    api_server: Mutex<Option<tokio::task::JoinHandle<Result<()>>>>,
}

impl PodcastDl {
    /// Create an application with production collaborators
    ///
    /// Opens (or creates) the database, builds the HTTP storage client and
    /// resolves the yt-dlp and ffmpeg binaries. When `config.api.enabled`
    /// is set the progress API server starts immediately.
    pub async fn new(config: Config) -> Result<Self> {
        for dir in [
            &config.download.tmp_audio_dir,
            &config.download.tmp_images_dir,
            &config.download.tmp_rss_dir,
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create temp directory '{}': {}", dir.display(), e),
                ))
            })?;
        }

        let db = match &config.database_path {
            Some(path) => Database::open(path).await?,
            None => Database::in_memory().await?,
        };
        let storage: Arc<dyn ObjectStorage> = Arc::new(HttpObjectStorage::new(
            &config.storage.endpoint_url,
            config.storage.request_timeout,
        )?);
        let provider: Arc<dyn MediaProvider> = Arc::new(YtDlpProvider::from_config(
            config.download.ytdlp_path.as_deref(),
        )?);
        let transcoder = Arc::new(Transcoder::from_config(&config.transcode)?);

        Self::with_components(config, db, storage, provider, transcoder)
    }

    /// Create an application from pre-built collaborators
    ///
    /// This is the injection seam: tests and embedders can supply their own
    /// storage or provider implementations.
    pub fn with_components(
        config: Config,
        db: Database,
        storage: Arc<dyn ObjectStorage>,
        provider: Arc<dyn MediaProvider>,
        transcoder: Arc<Transcoder>,
    ) -> Result<Self> {
        let channel = ProgressChannel::new();
        let tracker = ProgressTracker::new(channel.clone(), config.progress.record_ttl);
        let config = Arc::new(config);

        let ctx = pipeline::TaskContext {
            db,
            storage,
            provider,
            transcoder,
            tracker,
            config: config.clone(),
        };

        let queue = JobQueue::start(ctx.clone(), &config.queue);
        let cancel = CancellationToken::new();

        let api_server = if config.api.enabled {
            let state = api::AppState {
                db: ctx.db.clone(),
                tracker: ctx.tracker.clone(),
                channel: channel.clone(),
                cancel: cancel.clone(),
                config: config.clone(),
            };
            Some(tokio::spawn(api::start_api_server(state)))
        } else {
            None
        };

        Ok(Self {
            ctx,
            channel,
            queue,
            cancel,
            api_server: Mutex::new(api_server),
        })
    }

    /// Submit a background task
    pub fn enqueue(&self, task: TaskKind) -> Result<()> {
        self.queue.enqueue(task)
    }

    /// Subscribe to raw progress signals (JSON-encoded [`ProgressSignal`]s)
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.channel.subscribe()
    }

    /// Current progress for one episode, if it is downloading
    pub async fn episode_progress(
        &self,
        episode_id: EpisodeId,
    ) -> Result<Option<ProgressItem>> {
        progress::report::episode_item(&self.ctx.db, &self.ctx.tracker, episode_id).await
    }

    /// Persistence handle, for embedders managing podcasts and episodes
    pub fn database(&self) -> &Database {
        &self.ctx.db
    }

    /// Stop the queue, the API server and close the database
    ///
    /// In-flight tasks run to completion first; new submissions are
    /// rejected as soon as shutdown begins.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down");
        self.queue.shutdown().await;
        self.cancel.cancel();

        let handle = {
            let mut api_server = self.api_server.lock().unwrap_or_else(|e| e.into_inner());
            api_server.take()
        };
        if let Some(handle) = handle {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Progress API exited with error"),
                Err(e) => tracing::error!(error = %e, "Progress API task terminated abnormally"),
            }
        }

        self.ctx.db.close().await;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

/// Run the application until a termination signal arrives, then shut down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(app: PodcastDl) -> Result<()> {
    wait_for_signal().await;
    app.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_helpers::{seed_episode, seed_podcast, test_context};
    use std::time::{Duration, Instant};

    async fn test_app() -> (PodcastDl, crate::pipeline::test_helpers::TestContext) {
        let t = test_context().await;
        let config = (*t.ctx.config).clone();
        let app = PodcastDl::with_components(
            config,
            t.ctx.db.clone(),
            t.ctx.storage.clone(),
            t.ctx.provider.clone(),
            t.ctx.transcoder.clone(),
        )
        .unwrap();
        (app, t)
    }

    #[tokio::test]
    async fn enqueued_download_publishes_and_signals() {
        let (app, t) = test_app().await;
        let podcast_id = seed_podcast(app.database(), "pub-1").await;
        let episode_id =
            seed_episode(app.database(), podcast_id, "dQw4w9WgXcQ", SourceType::Youtube).await;

        let mut signals = app.subscribe();
        app.enqueue(TaskKind::DownloadEpisode { episode_id }).unwrap();

        let raw = tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                if let Ok(raw) = signals.recv().await {
                    break raw;
                }
            }
        })
        .await
        .unwrap();
        let signal: ProgressSignal = serde_json::from_str(&raw).unwrap();
        assert!(signal.episode_ids.contains(&episode_id));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let episode = app.database().get_episode_required(episode_id).await.unwrap();
            if episode.status() == EpisodeStatus::Published {
                break;
            }
            assert!(Instant::now() < deadline, "episode not published in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(t);
        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_rejects_further_work() {
        let (app, _t) = test_app().await;
        app.shutdown().await.unwrap();
        let err = app
            .enqueue(TaskKind::RegenerateRss { podcast_ids: vec![] })
            .unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
    }
}
