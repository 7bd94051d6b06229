//! Joining ephemeral progress records with episode/podcast identity.

use std::collections::HashMap;

use crate::db::{Database, Episode};
use crate::error::Result;
use crate::types::{
    EpisodeId, EpisodeStatus, EpisodeSummary, PodcastSummary, ProgressItem, ProgressStage,
};

use super::ProgressTracker;

/// Progress for every episode currently downloading
pub async fn in_progress_items(
    db: &Database,
    tracker: &ProgressTracker,
) -> Result<Vec<ProgressItem>> {
    let episodes = db.list_in_progress_episodes().await?;
    items_for_episodes(db, tracker, episodes).await
}

/// Progress for a specific set of episodes (WebSocket signal payloads)
pub async fn items_for_ids(
    db: &Database,
    tracker: &ProgressTracker,
    episode_ids: &[EpisodeId],
) -> Result<Vec<ProgressItem>> {
    let mut episodes = Vec::with_capacity(episode_ids.len());
    for &id in episode_ids {
        if let Some(episode) = db.get_episode(id).await? {
            episodes.push(episode);
        }
    }
    items_for_episodes(db, tracker, episodes).await
}

/// Progress for one episode, None when it is not in a downloading state
pub async fn episode_item(
    db: &Database,
    tracker: &ProgressTracker,
    episode_id: EpisodeId,
) -> Result<Option<ProgressItem>> {
    let episode = db.get_episode_required(episode_id).await?;
    if episode.status() != EpisodeStatus::Downloading {
        return Ok(None);
    }
    let items = items_for_episodes(db, tracker, vec![episode]).await?;
    Ok(items.into_iter().next())
}

async fn items_for_episodes(
    db: &Database,
    tracker: &ProgressTracker,
    episodes: Vec<Episode>,
) -> Result<Vec<ProgressItem>> {
    let podcasts: HashMap<_, _> = db
        .list_podcasts()
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    let mut items = Vec::with_capacity(episodes.len());
    for episode in episodes {
        let Some(podcast) = podcasts.get(&episode.podcast_id) else {
            tracing::warn!(
                episode_id = %episode.id,
                podcast_id = %episode.podcast_id,
                "Skipping progress item for episode without podcast"
            );
            continue;
        };

        // No tracker record yet means the job has not moved bytes
        let progress = tracker
            .get(episode.id)
            .unwrap_or_else(crate::types::Progress::pending);
        let stage = if episode.status() == EpisodeStatus::Error {
            ProgressStage::Error
        } else {
            progress.stage
        };

        let image_url = image_url_for(db, episode.image_file_id).await?;
        items.push(ProgressItem {
            status: stage,
            total_bytes: progress.total_bytes,
            processed_bytes: progress.processed_bytes,
            episode: EpisodeSummary {
                id: episode.id,
                title: episode.title.clone(),
                image_url,
                status: episode.status(),
            },
            podcast: PodcastSummary {
                id: podcast.id,
                name: podcast.name.clone(),
                image_url: podcast.image_url.clone(),
            },
        });
    }
    Ok(items)
}

/// Prefer the stored cover path, falling back to the origin thumbnail URL
async fn image_url_for(db: &Database, image_file_id: i64) -> Result<Option<String>> {
    let Some(file) = db.get_file(image_file_id).await? else {
        return Ok(None);
    };
    if file.available && !file.path.is_empty() {
        Ok(Some(file.path))
    } else {
        Ok(file.source_url)
    }
}
