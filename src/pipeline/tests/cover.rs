//! Tests for cover fetching, scaling and bounded upload retry.

use crate::db::FileUpdate;
use crate::pipeline::run_task;
use crate::pipeline::test_helpers::{seed_episode, seed_podcast, test_context};
use crate::types::{FinishCode, SourceType, TaskKind};

#[tokio::test]
async fn cover_is_fetched_scaled_and_stored() {
    let t = test_context().await;
    let podcast_id = seed_podcast(&t.ctx.db, "pub-1").await;
    let episode_id = seed_episode(&t.ctx.db, podcast_id, "dQw4w9WgXcQ", SourceType::Youtube).await;

    let code = run_task(
        &t.ctx,
        &TaskKind::FetchEpisodeCover {
            episode_id: Some(episode_id),
        },
    )
    .await;
    assert_eq!(code, FinishCode::Ok);

    let episode = t.ctx.db.get_episode_required(episode_id).await.unwrap();
    let image = t.ctx.db.get_file_required(episode.image_file_id).await.unwrap();
    assert_eq!(image.path, "images/dQw4w9WgXcQ_cover.jpg");
    assert!(image.available);
    assert!(image.size > 0);
    assert!(t.storage.object_size(&image.path).is_some());
}

#[tokio::test]
async fn already_stored_cover_is_left_alone() {
    let t = test_context().await;
    let podcast_id = seed_podcast(&t.ctx.db, "pub-1").await;
    let episode_id = seed_episode(&t.ctx.db, podcast_id, "dQw4w9WgXcQ", SourceType::Youtube).await;
    let episode = t.ctx.db.get_episode_required(episode_id).await.unwrap();
    t.ctx
        .db
        .update_file(
            episode.image_file_id,
            &FileUpdate {
                path: Some("images/dQw4w9WgXcQ_cover.jpg".to_string()),
                available: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let code = run_task(
        &t.ctx,
        &TaskKind::FetchEpisodeCover {
            episode_id: Some(episode_id),
        },
    )
    .await;
    assert_eq!(code, FinishCode::Ok);
    assert_eq!(t.storage.calls_matching("upload:images/"), 0);
}

#[tokio::test]
async fn missing_origin_cover_resets_the_record() {
    let t = test_context().await;
    let podcast_id = seed_podcast(&t.ctx.db, "pub-1").await;
    let episode_id = seed_episode(&t.ctx.db, podcast_id, "dQw4w9WgXcQ", SourceType::Youtube).await;

    t.provider.cover_not_found();
    let code = run_task(
        &t.ctx,
        &TaskKind::FetchEpisodeCover {
            episode_id: Some(episode_id),
        },
    )
    .await;
    assert_eq!(code, FinishCode::Ok, "a 404 cover is not a task failure");

    let episode = t.ctx.db.get_episode_required(episode_id).await.unwrap();
    let image = t.ctx.db.get_file_required(episode.image_file_id).await.unwrap();
    assert_eq!(image.path, "");
    assert!(!image.available);
}

#[tokio::test]
async fn upload_exhaustion_resets_record_and_reports_error() {
    let t = test_context().await;
    let podcast_id = seed_podcast(&t.ctx.db, "pub-1").await;
    let episode_id = seed_episode(&t.ctx.db, podcast_id, "dQw4w9WgXcQ", SourceType::Youtube).await;

    // max_attempts is 3 in the test config
    t.storage.fail_next_uploads(3);
    let code = run_task(
        &t.ctx,
        &TaskKind::FetchEpisodeCover {
            episode_id: Some(episode_id),
        },
    )
    .await;
    assert_eq!(code, FinishCode::Error);

    assert_eq!(t.storage.calls_matching("upload:images/"), 3);
    let episode = t.ctx.db.get_episode_required(episode_id).await.unwrap();
    let image = t.ctx.db.get_file_required(episode.image_file_id).await.unwrap();
    assert_eq!(image.path, "");
    assert!(!image.available);
}

#[tokio::test]
async fn batch_continues_past_a_failing_episode() {
    let t = test_context().await;
    let podcast_id = seed_podcast(&t.ctx.db, "pub-1").await;
    let first = seed_episode(&t.ctx.db, podcast_id, "aaaaaaaaaaa", SourceType::Youtube).await;
    let second = seed_episode(&t.ctx.db, podcast_id, "bbbbbbbbbbb", SourceType::Youtube).await;

    // Exactly enough failures to exhaust the first episode's retries
    t.storage.fail_next_uploads(3);
    let code = run_task(&t.ctx, &TaskKind::FetchEpisodeCover { episode_id: None }).await;
    assert_eq!(code, FinishCode::Error, "any failed episode fails the batch");

    let first_ep = t.ctx.db.get_episode_required(first).await.unwrap();
    let first_image = t.ctx.db.get_file_required(first_ep.image_file_id).await.unwrap();
    assert!(!first_image.available);

    let second_ep = t.ctx.db.get_episode_required(second).await.unwrap();
    let second_image = t
        .ctx
        .db
        .get_file_required(second_ep.image_file_id)
        .await
        .unwrap();
    assert_eq!(second_image.path, "images/bbbbbbbbbbb_cover.jpg");
    assert!(second_image.available);
}
