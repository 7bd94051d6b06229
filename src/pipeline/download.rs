//! Download pipeline for one episode: fetch, transcode, upload, publish.

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::{Episode, EpisodeUpdate, FileRecord, FileUpdate};
use crate::error::Error;
use crate::types::{EpisodeId, EpisodeStatus, FinishCode, Progress, ProgressStage};

use super::{PipelineAbort, StageResult, TaskContext, rss};

/// Run the download pipeline for one episode
///
/// The boundary below converts every abort into a [`FinishCode`]; an
/// unexpected failure additionally moves the episode row to `error`.
pub(crate) async fn run(ctx: &TaskContext, episode_id: EpisodeId) -> FinishCode {
    match perform(ctx, episode_id).await {
        Ok(code) => code,
        Err(PipelineAbort::Interrupted { code, reason }) => {
            match code {
                FinishCode::Error => {
                    tracing::error!(episode_id = %episode_id, reason = %reason, "Episode downloading was interrupted")
                }
                _ => {
                    tracing::info!(episode_id = %episode_id, reason = %reason, "Episode downloading was interrupted")
                }
            }
            code
        }
        Err(PipelineAbort::Failure(e)) => {
            tracing::error!(episode_id = %episode_id, error = %e, "Unable to prepare/publish episode");
            if let Err(db_err) = ctx
                .db
                .update_episode(episode_id, &EpisodeUpdate::status(EpisodeStatus::Error))
                .await
            {
                tracing::error!(episode_id = %episode_id, error = %db_err, "Failed to persist error status");
            }
            FinishCode::Error
        }
    }
}

/// Main sequence: short-circuit, cleanup, mark, fetch, process, upload, publish
async fn perform(ctx: &TaskContext, episode_id: EpisodeId) -> StageResult<FinishCode> {
    let episode = ctx.db.get_episode_required(episode_id).await?;
    let audio = ctx.db.get_file_required(episode.audio_file_id).await?;

    tracing::info!(
        source_id = %episode.source_id,
        url = episode.watch_url.as_deref().unwrap_or("-"),
        "=== START downloading process ==="
    );

    check_is_needed(ctx, &episode, &audio).await?;
    remove_unfinished(ctx, &episode, &audio).await;
    update_episode_group(ctx, &episode, &EpisodeUpdate::status(EpisodeStatus::Downloading)).await?;
    ctx.tracker.set(episode_id, Progress::pending());

    let tmp_audio_path = acquire_media(ctx, &episode, &audio).await?;
    process_file(ctx, &episode, &tmp_audio_path).await?;
    let content_hash = hash_local_file(&tmp_audio_path).await;
    let remote_file_size = upload_file(ctx, &episode, &audio, &tmp_audio_path).await?;

    update_episode_group(ctx, &episode, &EpisodeUpdate::published(episode.created_at)).await?;
    update_file_group(
        ctx,
        &episode,
        &audio,
        &FileUpdate {
            size: Some(remote_file_size),
            available: Some(true),
            content_hash,
            ..Default::default()
        },
    )
    .await?;
    update_all_rss(ctx, &episode.source_id).await?;

    remove_local_quietly(&tmp_audio_path).await;
    ctx.tracker.clear(episode_id);

    tracing::info!(source_id = %episode.source_id, "=== DOWNLOADING total finished ===");
    signal_group(ctx, &episode).await;
    Ok(FinishCode::Ok)
}

/// Idempotent short-circuit: a stored file with the recorded size means a
/// prior run already published this source correctly
async fn check_is_needed(
    ctx: &TaskContext,
    episode: &Episode,
    audio: &FileRecord,
) -> StageResult<()> {
    if audio.path.is_empty() {
        return Ok(());
    }

    let stored_size = ctx.storage.size(&audio.path).await;
    if stored_size > 0 && stored_size == audio.size {
        tracing::info!(
            source_id = %episode.source_id,
            "Episode already downloaded and file correct. Downloading will be ignored."
        );
        update_episode_group(ctx, episode, &EpisodeUpdate::published(episode.created_at)).await?;
        update_file_group(
            ctx,
            episode,
            audio,
            &FileUpdate {
                size: Some(stored_size),
                ..Default::default()
            },
        )
        .await?;
        update_all_rss(ctx, &episode.source_id).await?;
        return Err(PipelineAbort::skip("already downloaded"));
    }
    Ok(())
}

/// A stored path on a row that is neither new nor downloading is a stale
/// artifact from a broken attempt; remove it before re-downloading
async fn remove_unfinished(ctx: &TaskContext, episode: &Episode, audio: &FileRecord) {
    if audio.path.is_empty() {
        return;
    }
    if !matches!(
        episode.status(),
        EpisodeStatus::New | EpisodeStatus::Downloading
    ) {
        tracing::warn!(
            source_id = %episode.source_id,
            status = %episode.status(),
            path = %audio.path,
            "Episode has a stored file with incorrect size. Removing it and reloading from the provider."
        );
        ctx.storage.delete(&audio.path).await;
    }
}

/// Fetch raw audio from the provider, or reuse the predefined path for
/// sources that never need downloading
async fn acquire_media(
    ctx: &TaskContext,
    episode: &Episode,
    audio: &FileRecord,
) -> StageResult<PathBuf> {
    if !episode.source_type().capabilities().need_downloading {
        if !audio.path.is_empty() {
            return Ok(PathBuf::from(&audio.path));
        }
        return Err(PipelineAbort::error(
            Error::Provider(crate::error::ProviderError::MissingUploadPath).to_string(),
        ));
    }

    let watch_url = episode.watch_url.as_deref().ok_or_else(|| {
        PipelineAbort::Failure(Error::NotFound(format!(
            "episode {} has no watch URL",
            episode.id
        )))
    })?;

    let dest = ctx
        .config
        .download
        .tmp_audio_dir
        .join(episode.audio_filename());
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineAbort::Failure(e.into()))?;
    }

    let tracker = ctx.tracker.clone();
    let episode_id = episode.id;
    let hook = Arc::new(move |processed: u64, total: u64| {
        tracker.set_stage(episode_id, ProgressStage::EpisodeDownloading, total, processed);
    });

    let cookie_file = resolve_cookie_file(ctx, episode).await?;
    let fetch_result = ctx
        .provider
        .fetch_audio(
            watch_url,
            &episode.source_id,
            &dest,
            cookie_file.as_deref(),
            hook,
        )
        .await;

    // Materialized per-episode cookies are transient
    if episode.cookie_id.is_some() {
        if let Some(path) = &cookie_file {
            remove_local_quietly(path).await;
        }
    }

    if let Err(e) = fetch_result {
        tracing::error!(
            source_id = %episode.source_id,
            error = %e,
            "=== Downloading FAILED: could not fetch track. All episodes will be moved to the ERROR state ==="
        );
        update_episode_group(ctx, episode, &EpisodeUpdate::status(EpisodeStatus::Error)).await?;
        update_file_group(
            ctx,
            episode,
            audio,
            &FileUpdate {
                available: Some(false),
                ..Default::default()
            },
        )
        .await?;
        ctx.tracker
            .set_stage(episode.id, ProgressStage::Error, 0, 0);
        signal_group(ctx, episode).await;
        return Err(PipelineAbort::error(format!("provider fetch failed: {}", e)));
    }

    tracing::info!(source_id = %episode.source_id, "=== DOWNLOADING was done ===");
    Ok(dest)
}

/// Cookie file handed to the provider for protected sources
///
/// An episode with an attached cookie record gets that cookie written to a
/// local file; otherwise the globally configured cookie file (if any) is
/// used.
async fn resolve_cookie_file(ctx: &TaskContext, episode: &Episode) -> StageResult<Option<PathBuf>> {
    let Some(cookie_id) = episode.cookie_id else {
        return Ok(ctx.config.download.cookie_file.clone());
    };

    let cookie = ctx.db.get_cookie_required(cookie_id).await?;
    let path = ctx
        .config
        .download
        .tmp_audio_dir
        .join(format!("cookie_{}.txt", cookie.id));
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineAbort::Failure(e.into()))?;
    }
    tokio::fs::write(&path, &cookie.data)
        .await
        .map_err(|e| PipelineAbort::Failure(e.into()))?;
    Ok(Some(path))
}

/// Normalize the fetched audio when the source requires it
async fn process_file(
    ctx: &TaskContext,
    episode: &Episode,
    tmp_audio_path: &std::path::Path,
) -> StageResult<()> {
    if !episode.source_type().capabilities().need_postprocessing {
        tracing::info!(source_id = %episode.source_id, "=== POST PROCESSING SKIP ===");
        return Ok(());
    }

    tracing::info!(source_id = %episode.source_id, "=== POST PROCESSING ===");
    let tracker = ctx.tracker.clone();
    let episode_id = episode.id;
    let hook = Arc::new(move |processed: u64, total: u64| {
        tracker.set_stage(
            episode_id,
            ProgressStage::EpisodePostprocessing,
            total,
            processed,
        );
    });
    ctx.transcoder
        .normalize_audio(tmp_audio_path, hook)
        .await
        .map_err(Error::Transcode)?;
    tracing::info!(source_id = %episode.source_id, "=== POST PROCESSING was done ===");
    Ok(())
}

/// Push the prepared file to object storage; returns the remote size
async fn upload_file(
    ctx: &TaskContext,
    episode: &Episode,
    audio: &FileRecord,
    tmp_audio_path: &std::path::Path,
) -> StageResult<i64> {
    tracing::info!(source_id = %episode.source_id, "=== UPLOADING ===");
    let local_size = tokio::fs::metadata(tmp_audio_path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    ctx.tracker
        .set_stage(episode.id, ProgressStage::EpisodeUploading, local_size, 0);

    let uploaded = ctx
        .storage
        .upload(
            tmp_audio_path,
            &ctx.config.storage.audio_dir,
            Some(&episode.audio_filename()),
        )
        .await;

    let Some(uploaded_path) = uploaded else {
        tracing::warn!(source_id = %episode.source_id, "=== UPLOADING was broken ===");
        update_episode_group(ctx, episode, &EpisodeUpdate::status(EpisodeStatus::Error)).await?;
        return Err(PipelineAbort::error("upload failed"));
    };

    update_file_group(
        ctx,
        episode,
        audio,
        &FileUpdate {
            path: Some(uploaded_path.clone()),
            ..Default::default()
        },
    )
    .await?;

    let result_size = ctx.storage.size(&uploaded_path).await;
    ctx.tracker.set_stage(
        episode.id,
        ProgressStage::EpisodeUploading,
        local_size,
        local_size,
    );
    tracing::info!(
        source_id = %episode.source_id,
        bytes = result_size,
        "=== UPLOADING was done ==="
    );
    Ok(result_size)
}

/// Regenerate RSS for every podcast containing this source
pub(crate) async fn update_all_rss(ctx: &TaskContext, source_id: &str) -> StageResult<()> {
    tracing::info!(source_id = %source_id, "Updating RSS for all podcasts with this source");
    let podcast_ids = ctx
        .db
        .list_podcast_ids_by_source(source_id)
        .await
        .map_err(PipelineAbort::Failure)?;
    tracing::info!(?podcast_ids, "Found podcasts for RSS updates");
    rss::perform(ctx, &podcast_ids).await?;
    Ok(())
}

/// Batched status update for all non-archived episodes sharing the source
async fn update_episode_group(
    ctx: &TaskContext,
    episode: &Episode,
    update: &EpisodeUpdate,
) -> StageResult<()> {
    tracing::debug!(
        source_id = %episode.source_id,
        source_type = %episode.source_type(),
        ?update,
        "Episode group update"
    );
    ctx.db
        .update_episode_group(&episode.source_id, episode.source_type(), update)
        .await
        .map_err(PipelineAbort::Failure)?;
    Ok(())
}

/// Batched update for all audio files fetched from the same source URL
async fn update_file_group(
    ctx: &TaskContext,
    episode: &Episode,
    audio: &FileRecord,
    update: &FileUpdate,
) -> StageResult<()> {
    match &audio.source_url {
        Some(source_url) => {
            ctx.db
                .update_files_by_source_url(source_url, update)
                .await
                .map_err(PipelineAbort::Failure)?;
        }
        None => {
            // No shared source URL (direct uploads): only this episode's file
            ctx.db
                .update_file(episode.audio_file_id, update)
                .await
                .map_err(PipelineAbort::Failure)?;
        }
    }
    Ok(())
}

/// Broadcast a progress-changed signal for the whole source group
async fn signal_group(ctx: &TaskContext, episode: &Episode) {
    match ctx
        .db
        .list_episodes_by_source(&episode.source_id, episode.source_type())
        .await
    {
        Ok(group) => ctx.tracker.signal(group.into_iter().map(|e| e.id).collect()),
        Err(e) => {
            tracing::warn!(source_id = %episode.source_id, error = %e, "Failed to list group for signal");
            ctx.tracker.signal(vec![episode.id]);
        }
    }
}

/// SHA-256 of the prepared local file, hex-encoded
///
/// Reads in fixed-size chunks: episode audio does not fit in memory.
/// Hashing is best effort: a read failure only drops the hash, never the
/// publication.
async fn hash_local_file(path: &std::path::Path) -> Option<String> {
    match hash_file_chunked(path).await {
        Ok(digest) => Some(digest),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Failed to hash local file");
            None
        }
    }
}

async fn hash_file_chunked(path: &std::path::Path) -> std::io::Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

async fn remove_local_quietly(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove local temp file");
        }
    }
}
