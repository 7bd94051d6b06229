//! Finalization of episodes whose audio was uploaded directly.
//!
//! The bytes already sit in object storage under a client-chosen temporary
//! key; this task validates the size against the record, copies the object
//! to its canonical location and publishes the episode.

use crate::db::{EpisodeUpdate, FileUpdate};
use crate::storage::remote_path;
use crate::types::{EpisodeId, EpisodeStatus, FinishCode};

use super::{PipelineAbort, StageResult, TaskContext, download};

pub(crate) async fn run(ctx: &TaskContext, episode_id: EpisodeId) -> FinishCode {
    match perform(ctx, episode_id).await {
        Ok(code) => code,
        Err(PipelineAbort::Interrupted { code, reason }) => {
            match code {
                FinishCode::Error => {
                    tracing::error!(episode_id = %episode_id, reason = %reason, "Uploaded episode finalization was interrupted")
                }
                _ => {
                    tracing::info!(episode_id = %episode_id, reason = %reason, "Uploaded episode finalization was interrupted")
                }
            }
            code
        }
        Err(PipelineAbort::Failure(e)) => {
            tracing::error!(episode_id = %episode_id, error = %e, "Unable to finalize uploaded episode");
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

async fn perform(ctx: &TaskContext, episode_id: EpisodeId) -> StageResult<FinishCode> {
    let episode = ctx.db.get_episode_required(episode_id).await?;
    let audio = ctx.db.get_file_required(episode.audio_file_id).await?;

    tracing::info!(
        source_id = %episode.source_id,
        path = %audio.path,
        "=== START performing uploaded episode ==="
    );

    // Storage is the source of truth for what actually landed; the record
    // carries the size the client reported at upload time
    let stored_size = ctx.storage.size(&audio.path).await;
    if episode.status() == EpisodeStatus::Published && stored_size == audio.size {
        return Err(PipelineAbort::skip(format!(
            "episode {} already published",
            episode_id
        )));
    }
    if stored_size != audio.size {
        return Err(PipelineAbort::error(format!(
            "performing uploaded file failed: incorrect remote file size: {}",
            stored_size
        )));
    }

    let canonical_path = copy_file(ctx, &episode, &audio.path).await?;
    let result_size = ctx.storage.size(&canonical_path).await;

    ctx.db
        .update_episode(episode_id, &EpisodeUpdate::published(episode.created_at))
        .await
        .map_err(PipelineAbort::Failure)?;
    ctx.db
        .update_file(
            episode.audio_file_id,
            &FileUpdate {
                path: Some(canonical_path),
                size: Some(result_size),
                available: Some(true),
                ..Default::default()
            },
        )
        .await
        .map_err(PipelineAbort::Failure)?;

    download::update_all_rss(ctx, &episode.source_id).await?;
    ctx.tracker.signal(vec![episode_id]);

    tracing::info!(source_id = %episode.source_id, "=== Uploaded episode finalization finished ===");
    Ok(FinishCode::Ok)
}

/// Copy the uploaded object from its temporary key to the canonical one
async fn copy_file(ctx: &TaskContext, episode: &crate::db::Episode, src: &str) -> StageResult<String> {
    tracing::info!(source_id = %episode.source_id, "=== REMOTE COPYING ===");
    let dst = remote_path(&ctx.config.storage.audio_dir, &episode.audio_filename());

    let Some(copied) = ctx.storage.copy(src, &dst).await else {
        tracing::warn!(source_id = %episode.source_id, "=== REMOTE COPYING was broken ===");
        ctx.db
            .update_episode(episode.id, &EpisodeUpdate::status(EpisodeStatus::Error))
            .await
            .map_err(PipelineAbort::Failure)?;
        return Err(PipelineAbort::error("remote copy failed"));
    };

    tracing::info!(
        source_id = %episode.source_id,
        src = %src,
        dst = %copied,
        "=== REMOTE COPYING was done ==="
    );
    Ok(copied)
}
