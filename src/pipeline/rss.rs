//! Podcast RSS feed regeneration.
//!
//! Renders each podcast's feed from its published episodes, uploads the XML
//! to object storage and keeps the podcast's RSS file record in sync. One
//! broken podcast never blocks the others; the task reports `Error` when any
//! podcast failed.

use std::path::PathBuf;

use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, ItemBuilder};

use crate::db::{Episode, FileUpdate, NewFile, Podcast};
use crate::error::{Error, Result};
use crate::types::{FinishCode, PodcastId};

use super::{PipelineAbort, StageResult, TaskContext};

pub(crate) async fn run(ctx: &TaskContext, podcast_ids: &[PodcastId]) -> FinishCode {
    match perform(ctx, podcast_ids).await {
        Ok(code) => code,
        Err(PipelineAbort::Interrupted { code, reason }) => {
            tracing::info!(reason = %reason, "RSS regeneration was interrupted");
            code
        }
        Err(PipelineAbort::Failure(e)) => {
            tracing::error!(error = %e, "Unable to regenerate RSS feeds");
            FinishCode::Error
        }
    }
}

/// Regenerate feeds for the given podcasts (all podcasts when empty)
///
/// Shared entry point for the standalone task and the pipeline finalization
/// step, which must not fail the whole download over one broken feed.
pub(crate) async fn perform(ctx: &TaskContext, podcast_ids: &[PodcastId]) -> StageResult<FinishCode> {
    let podcasts = if podcast_ids.is_empty() {
        ctx.db.list_podcasts().await?
    } else {
        let mut podcasts = Vec::with_capacity(podcast_ids.len());
        for &id in podcast_ids {
            podcasts.push(ctx.db.get_podcast_required(id).await?);
        }
        podcasts
    };

    let mut results = Vec::with_capacity(podcasts.len());
    for podcast in &podcasts {
        let code = match generate(ctx, podcast).await {
            Ok(()) => FinishCode::Ok,
            Err(e) => {
                tracing::error!(
                    podcast_id = %podcast.id,
                    error = %e,
                    "RSS regeneration failed for podcast"
                );
                FinishCode::Error
            }
        };
        results.push((podcast.id, code));
    }
    tracing::info!(?results, "RSS regeneration results");

    if results.iter().any(|(_, code)| *code == FinishCode::Error) {
        return Ok(FinishCode::Error);
    }
    Ok(FinishCode::Ok)
}

/// Render one podcast's feed, upload it and sync the RSS file record
async fn generate(ctx: &TaskContext, podcast: &Podcast) -> Result<()> {
    tracing::info!(podcast_id = %podcast.id, "START rss generation");
    let local_path = render_to_file(ctx, podcast).await?;
    let local_size = tokio::fs::metadata(&local_path).await?.len() as i64;

    let Some(remote_path) = ctx
        .storage
        .upload(&local_path, &ctx.config.storage.rss_dir, None)
        .await
    else {
        return Err(Error::Storage(crate::error::StorageError::UploadFailed {
            path: local_path,
        }));
    };

    let rss_update = FileUpdate {
        path: Some(remote_path.clone()),
        size: Some(local_size),
        available: Some(true),
        ..Default::default()
    };
    match podcast.rss_file_id {
        Some(rss_file_id) => ctx.db.update_file(rss_file_id, &rss_update).await?,
        None => {
            let rss_file_id = ctx
                .db
                .insert_file(&NewFile {
                    path: remote_path.clone(),
                    size: local_size,
                    available: true,
                    ..Default::default()
                })
                .await?;
            ctx.db.set_podcast_rss_file(podcast.id, rss_file_id).await?;
        }
    }

    tracing::info!(
        podcast_id = %podcast.id,
        path = %remote_path,
        "FINISH rss generation: file uploaded, podcast record updated"
    );
    Ok(())
}

/// Render the feed XML into the temp RSS dir as `<publish_id>.xml`
async fn render_to_file(ctx: &TaskContext, podcast: &Podcast) -> Result<PathBuf> {
    let episodes = ctx.db.list_published_episodes(podcast.id).await?;
    tracing::info!(
        podcast_id = %podcast.id,
        episodes = episodes.len(),
        "Rendering RSS feed"
    );

    let mut items = Vec::with_capacity(episodes.len());
    for episode in &episodes {
        if let Some(item) = feed_item(ctx, episode).await? {
            items.push(item);
        }
    }

    let mut channel_builder = ChannelBuilder::default();
    channel_builder
        .title(podcast.name.clone())
        .link(ctx.config.storage.public_url(&format!(
            "{}/{}.xml",
            ctx.config.storage.rss_dir, podcast.publish_id
        )))
        .description(podcast.description.clone().unwrap_or_default())
        .items(items);
    if let Some(image_url) = &podcast.image_url {
        channel_builder.image(Some(
            ImageBuilder::default()
                .url(image_url.clone())
                .title(podcast.name.clone())
                .build(),
        ));
    }
    let channel = channel_builder.build();

    let dir = &ctx.config.download.tmp_rss_dir;
    tokio::fs::create_dir_all(dir).await?;
    let local_path = dir.join(format!("{}.xml", podcast.publish_id));
    let xml = channel.to_string();
    tokio::fs::write(&local_path, xml.as_bytes()).await?;

    tracing::info!(podcast_id = %podcast.id, path = %local_path.display(), "RSS file generated");
    Ok(local_path)
}

/// One `<item>` per published episode; episodes whose audio is not yet
/// servable are left out of the feed
async fn feed_item(ctx: &TaskContext, episode: &Episode) -> Result<Option<rss::Item>> {
    let audio = ctx.db.get_file_required(episode.audio_file_id).await?;
    if !audio.available || audio.path.is_empty() {
        return Ok(None);
    }

    let enclosure = EnclosureBuilder::default()
        .url(ctx.config.storage.public_url(&audio.path))
        .length(audio.size.to_string())
        .mime_type("audio/mpeg".to_string())
        .build();

    let pub_date = episode
        .published_at
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.to_rfc2822());

    let item = ItemBuilder::default()
        .title(Some(episode.title.clone()))
        .description(episode.description.clone())
        .author(episode.author.clone())
        .guid(Some(
            GuidBuilder::default()
                .value(episode.source_id.clone())
                .permalink(false)
                .build(),
        ))
        .pub_date(pub_date)
        .enclosure(Some(enclosure))
        .build();
    Ok(Some(item))
}
