//! Cover image fetching: download, scale and store episode covers.
//!
//! Runs over one episode or the whole table. Failures are contained per
//! episode: a cover that cannot be fetched or stored resets that episode's
//! image record and the batch keeps going.

use std::path::PathBuf;

use crate::db::{Episode, FileUpdate};
use crate::error::{Error, ProviderError, StorageError};
use crate::retry::retry_with_backoff;
use crate::types::{EpisodeId, FinishCode, ProgressStage};

use super::{PipelineAbort, StageResult, TaskContext};

pub(crate) async fn run(ctx: &TaskContext, episode_id: Option<EpisodeId>) -> FinishCode {
    match perform(ctx, episode_id).await {
        Ok(code) => code,
        Err(PipelineAbort::Interrupted { code, reason }) => {
            tracing::info!(reason = %reason, "Cover fetching was interrupted");
            code
        }
        Err(PipelineAbort::Failure(e)) => {
            tracing::error!(error = %e, "Unable to fetch episode covers");
            FinishCode::Error
        }
    }
}

async fn perform(ctx: &TaskContext, episode_id: Option<EpisodeId>) -> StageResult<FinishCode> {
    let episodes = match episode_id {
        Some(id) => vec![ctx.db.get_episode_required(id).await?],
        None => ctx.db.list_episodes().await?,
    };
    let episodes_count = episodes.len();
    let mut failed = 0usize;

    for (index, episode) in episodes.iter().enumerate() {
        tracing::info!(index = index + 1, total = episodes_count, "=== Episode cover ===");
        if let Err(e) = process_episode(ctx, episode).await {
            tracing::error!(
                episode_id = %episode.id,
                error = %e,
                "Unable to upload episode's image"
            );
            failed += 1;
        }
    }

    if failed > 0 {
        tracing::error!(failed, total = episodes_count, "Some covers could not be stored");
        return Ok(FinishCode::Error);
    }
    Ok(FinishCode::Ok)
}

/// Fetch, scale and upload one episode's cover; resets the image record on
/// any failure so the reporting side falls back to the origin thumbnail
async fn process_episode(ctx: &TaskContext, episode: &Episode) -> crate::error::Result<()> {
    let image = ctx.db.get_file_required(episode.image_file_id).await?;

    // A path under the images dir means a previous run already stored it
    if image.path.starts_with(&ctx.config.storage.images_dir) {
        tracing::info!(
            episode_id = %episode.id,
            path = %image.path,
            "Skip episode: cover already stored"
        );
        return Ok(());
    }

    let outcome = fetch_and_store(ctx, episode, &image.source_url).await;
    ctx.tracker.clear(episode.id);

    match outcome {
        Ok(Some((remote_path, size))) => {
            tracing::info!(
                episode_id = %episode.id,
                remote = %remote_path,
                "Saving new cover path"
            );
            ctx.db
                .update_file(
                    episode.image_file_id,
                    &FileUpdate {
                        path: Some(remote_path),
                        size: Some(size),
                        available: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            Ok(())
        }
        Ok(None) => {
            // Origin has no cover: clear the record and move on
            reset_image_record(ctx, episode).await?;
            Ok(())
        }
        Err(e) => {
            reset_image_record(ctx, episode).await?;
            Err(e)
        }
    }
}

/// Returns the stored (path, size), or None when the origin has no cover
async fn fetch_and_store(
    ctx: &TaskContext,
    episode: &Episode,
    source_url: &Option<String>,
) -> crate::error::Result<Option<(String, i64)>> {
    let Some(source_url) = source_url.as_deref() else {
        tracing::info!(episode_id = %episode.id, "Episode has no cover URL");
        return Ok(None);
    };

    let tmp_path = download_cover(ctx, episode, source_url).await?;
    let Some(tmp_path) = tmp_path else {
        return Ok(None);
    };

    ctx.transcoder.scale_image(&tmp_path).await?;

    let size = tokio::fs::metadata(&tmp_path).await.map(|m| m.len() as i64)?;
    ctx.tracker
        .set_stage(episode.id, ProgressStage::CoverUploading, size as u64, 0);

    let retry = &ctx.config.cover_retry;
    let storage = ctx.storage.clone();
    let images_dir = ctx.config.storage.images_dir.clone();
    let filename = episode.image_filename();
    let remote_path = retry_with_backoff(retry.max_attempts, retry.base_delay, || {
        let storage = storage.clone();
        let tmp = tmp_path.clone();
        let dir = images_dir.clone();
        let filename = filename.clone();
        async move {
            storage
                .upload(&tmp, &dir, Some(&filename))
                .await
                .ok_or(StorageError::UploadFailed { path: tmp })
        }
    })
    .await
    .map_err(|_| Error::MaxAttemptsReached("couldn't upload cover for episode".to_string()))?;

    remove_local_quietly(&tmp_path).await;
    Ok(Some((remote_path, size)))
}

/// Fetch the origin thumbnail into the temp images dir; None when the
/// origin responds 404
async fn download_cover(
    ctx: &TaskContext,
    episode: &Episode,
    source_url: &str,
) -> crate::error::Result<Option<PathBuf>> {
    let dest = ctx
        .config
        .download
        .tmp_images_dir
        .join(episode.image_filename());
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    ctx.tracker
        .set_stage(episode.id, ProgressStage::CoverDownloading, 0, 0);

    match ctx.provider.fetch_cover(source_url, &dest).await {
        Ok(()) => Ok(Some(dest)),
        Err(ProviderError::NotFound(_)) => {
            tracing::info!(
                episode_id = %episode.id,
                url = %source_url,
                "Cover not found at the origin"
            );
            Ok(None)
        }
        Err(e) => Err(Error::Provider(e)),
    }
}

async fn reset_image_record(ctx: &TaskContext, episode: &Episode) -> crate::error::Result<()> {
    ctx.db
        .update_file(
            episode.image_file_id,
            &FileUpdate {
                path: Some(String::new()),
                size: Some(0),
                available: Some(false),
                ..Default::default()
            },
        )
        .await
}

async fn remove_local_quietly(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove local temp file");
        }
    }
}
