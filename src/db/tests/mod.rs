//! Database layer tests against in-memory SQLite.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::db::{Database, EpisodeUpdate, FileUpdate, NewCookie, NewEpisode, NewFile, NewPodcast};
use crate::types::{EpisodeId, EpisodeStatus, PodcastId, SourceType};


/// Helper: fresh in-memory database with migrations applied
async fn test_db() -> Database {
    Database::in_memory().await.unwrap()
}

/// Helper: podcast + file rows and one episode for the given source
async fn seed_episode(db: &Database, source_id: &str, source_type: SourceType) -> EpisodeId {
    let podcast_id = seed_podcast(db, "Test podcast").await;
    seed_episode_in(db, podcast_id, source_id, source_type).await
}

async fn seed_podcast(db: &Database, name: &str) -> PodcastId {
    db.insert_podcast(&NewPodcast {
        publish_id: format!("pub-{}", name.to_lowercase().replace(' ', "-")),
        name: name.to_string(),
        description: None,
        image_url: None,
        download_automatically: true,
    })
    .await
    .unwrap()
}

async fn seed_episode_in(
    db: &Database,
    podcast_id: PodcastId,
    source_id: &str,
    source_type: SourceType,
) -> EpisodeId {
    let audio_file_id = db
        .insert_file(&NewFile {
            source_url: Some(format!("https://media.example.com/{}", source_id)),
            ..Default::default()
        })
        .await
        .unwrap();
    let image_file_id = db
        .insert_file(&NewFile {
            source_url: Some(format!("https://img.example.com/{}.jpg", source_id)),
            ..Default::default()
        })
        .await
        .unwrap();

    db.insert_episode(&NewEpisode {
        podcast_id,
        source_id: source_id.to_string(),
        source_type,
        watch_url: Some(format!("https://youtube.com/watch?v={}", source_id)),
        title: format!("Episode {}", source_id),
        author: Some("author".to_string()),
        description: None,
        audio_file_id,
        image_file_id,
        cookie_id: None,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let db = test_db().await;
    db.migrate().await.unwrap();
    db.migrate().await.unwrap();
}

#[tokio::test]
async fn podcast_roundtrip() {
    let db = test_db().await;
    let id = seed_podcast(&db, "My show").await;

    let podcast = db.get_podcast(id).await.unwrap().unwrap();
    assert_eq!(podcast.name, "My show");
    assert!(podcast.rss_file_id.is_none());
    assert!(podcast.download_automatically);

    let rss_file_id = db.insert_file(&NewFile::default()).await.unwrap();
    db.set_podcast_rss_file(id, rss_file_id).await.unwrap();
    let podcast = db.get_podcast(id).await.unwrap().unwrap();
    assert_eq!(podcast.rss_file_id, Some(rss_file_id));
}

#[tokio::test]
async fn get_missing_podcast_returns_none() {
    let db = test_db().await;
    assert!(db.get_podcast(PodcastId(999)).await.unwrap().is_none());
}
