//! Episode acquisition pipeline: the background task state machines.
//!
//! Each task operates on one episode (or one batch, for covers/RSS) and runs
//! to a [`FinishCode`]. Nothing here panics the worker: every stage failure
//! is caught at the task boundary, logged with episode/source context, and
//! persisted as episode status `error` where applicable.
//!
//! ## Tasks
//!
//! - [`download`]: fetch/transcode/upload/publish for provider-sourced episodes
//! - [`uploaded`]: finalize episodes whose bytes were uploaded directly
//! - [`cover`]: fetch, scale and store cover images with bounded upload retry
//! - [`rss`]: re-render and re-upload podcast feeds

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::Error;
use crate::progress::ProgressTracker;
use crate::provider::MediaProvider;
use crate::storage::ObjectStorage;
use crate::transcode::Transcoder;
use crate::types::{FinishCode, TaskKind};

pub(crate) mod cover;
pub(crate) mod download;
pub(crate) mod rss;
pub(crate) mod uploaded;

#[cfg(test)]
pub(crate) mod test_helpers;
#[cfg(test)]
mod tests;

/// Injected collaborators shared by all pipeline tasks
///
/// Constructed once per [`crate::PodcastDl`] and cloned into each task run;
/// every handle is cheap to clone.
#[derive(Clone)]
pub struct TaskContext {
    /// Persistence handle
    pub db: Database,
    /// Object storage client
    pub storage: Arc<dyn ObjectStorage>,
    /// Media provider (yt-dlp wrapper in production)
    pub provider: Arc<dyn MediaProvider>,
    /// ffmpeg wrapper
    pub transcoder: Arc<Transcoder>,
    /// Ephemeral progress writer
    pub tracker: ProgressTracker,
    /// Crate configuration
    pub config: Arc<Config>,
}

/// Early termination of a pipeline run
///
/// `Interrupted` is deliberate control flow (already downloaded, fatal
/// provider response, broken upload) carrying the outcome code directly;
/// `Failure` is an unexpected error mapped to [`FinishCode::Error`] at the
/// boundary. The two differ in log severity, not in what the queue sees.
#[derive(Debug)]
pub(crate) enum PipelineAbort {
    /// Deliberate early exit with a known outcome
    Interrupted {
        /// Outcome reported to the queue
        code: FinishCode,
        /// Human-readable reason for the log line
        reason: String,
    },
    /// Unexpected stage failure
    Failure(Error),
}

impl PipelineAbort {
    pub(crate) fn skip(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            code: FinishCode::Skip,
            reason: reason.into(),
        }
    }

    pub(crate) fn error(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            code: FinishCode::Error,
            reason: reason.into(),
        }
    }
}

impl From<Error> for PipelineAbort {
    fn from(e: Error) -> Self {
        Self::Failure(e)
    }
}

pub(crate) type StageResult<T> = std::result::Result<T, PipelineAbort>;

/// Execute one task to completion and report its outcome
///
/// This is the single entry point the job queue dispatches through. The
/// outcome severity split matters for alerting: `Ok`/`Skip` land at info,
/// `Error` at error.
pub async fn run_task(ctx: &TaskContext, task: &TaskKind) -> FinishCode {
    tracing::info!(task = task.name(), "==== Task started ====");

    let code = match task {
        TaskKind::DownloadEpisode { episode_id } => download::run(ctx, *episode_id).await,
        TaskKind::FinalizeUploadedEpisode { episode_id } => uploaded::run(ctx, *episode_id).await,
        TaskKind::FetchEpisodeCover { episode_id } => cover::run(ctx, *episode_id).await,
        TaskKind::RegenerateRss { podcast_ids } => rss::run(ctx, podcast_ids).await,
    };

    match code {
        FinishCode::Error => {
            tracing::error!(task = task.name(), code = ?code, "==== Task finished ====")
        }
        _ => tracing::info!(task = task.name(), code = ?code, "==== Task finished ===="),
    }
    code
}
