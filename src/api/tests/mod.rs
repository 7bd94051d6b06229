#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::api::ws::{ProgressSink, pump};
use crate::api::{AppState, create_router};
use crate::config::Config;
use crate::db::{Database, EpisodeUpdate};
use crate::pipeline::test_helpers::{seed_episode, seed_podcast};
use crate::progress::{ProgressChannel, ProgressTracker};
use crate::types::{
    EpisodeId, EpisodeStatus, ProgressEnvelope, ProgressSignal, ProgressStage, SourceType,
};

async fn test_state() -> AppState {
    let db = Database::in_memory().await.unwrap();
    let channel = ProgressChannel::new();
    let tracker = ProgressTracker::new(channel.clone(), Duration::from_secs(60));
    AppState {
        db,
        tracker,
        channel,
        cancel: CancellationToken::new(),
        config: Arc::new(Config::default()),
    }
}

async fn seed_downloading_episode(state: &AppState) -> EpisodeId {
    let podcast_id = seed_podcast(&state.db, "pub-1").await;
    let episode_id = seed_episode(&state.db, podcast_id, "dQw4w9WgXcQ", SourceType::Youtube).await;
    state
        .db
        .update_episode(episode_id, &EpisodeUpdate::status(EpisodeStatus::Downloading))
        .await
        .unwrap();
    episode_id
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = create_router(test_state().await);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn progress_endpoint_returns_in_progress_snapshot() {
    let state = test_state().await;
    let episode_id = seed_downloading_episode(&state).await;
    state
        .tracker
        .set_stage(episode_id, ProgressStage::EpisodeDownloading, 100, 25);

    let app = create_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/progress")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let items = json["progressItems"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["status"], "episode_downloading");
    assert_eq!(items[0]["processed_bytes"], 25);
    assert_eq!(items[0]["episode"]["id"], episode_id.get());
}

#[tokio::test]
async fn episode_progress_is_null_outside_downloading() {
    let state = test_state().await;
    let podcast_id = seed_podcast(&state.db, "pub-1").await;
    let episode_id = seed_episode(&state.db, podcast_id, "dQw4w9WgXcQ", SourceType::Youtube).await;

    let app = create_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/progress/{}", episode_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await.is_null());
}

#[tokio::test]
async fn unknown_episode_is_a_404() {
    let app = create_router(test_state().await);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/progress/999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Test sink collecting envelopes in memory
struct VecSink(Arc<Mutex<Vec<ProgressEnvelope>>>);

#[async_trait::async_trait]
impl ProgressSink for VecSink {
    async fn send_envelope(&mut self, envelope: &ProgressEnvelope) -> bool {
        self.0.lock().unwrap().push(envelope.clone());
        true
    }
}

struct PumpHarness {
    state: AppState,
    collected: Arc<Mutex<Vec<ProgressEnvelope>>>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

async fn start_pump(state: AppState) -> PumpHarness {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancellationToken::new();
    let mut sink = VecSink(collected.clone());
    let rx = state.channel.subscribe();
    let db = state.db.clone();
    let tracker = state.tracker.clone();
    let pump_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        pump(
            &db,
            &tracker,
            rx,
            pump_cancel,
            Duration::from_millis(20),
            &mut sink,
        )
        .await;
    });
    PumpHarness {
        state,
        collected,
        cancel,
        handle,
    }
}

async fn wait_for_envelopes(collected: &Arc<Mutex<Vec<ProgressEnvelope>>>, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if collected.lock().unwrap().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} envelopes within the deadline", count);
}

#[tokio::test]
async fn pump_forwards_signals_as_envelopes() {
    let state = test_state().await;
    let episode_id = seed_downloading_episode(&state).await;
    state
        .tracker
        .set_stage(episode_id, ProgressStage::EpisodeUploading, 1000, 400);

    let harness = start_pump(state).await;
    harness.state.tracker.signal(vec![episode_id]);

    wait_for_envelopes(&harness.collected, 1).await;
    {
        let envelopes = harness.collected.lock().unwrap();
        assert_eq!(envelopes[0].progress_items.len(), 1);
        assert_eq!(
            envelopes[0].progress_items[0].status,
            ProgressStage::EpisodeUploading
        );
    }
    harness.cancel.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test]
async fn malformed_channel_payloads_are_ignored() {
    let state = test_state().await;
    let episode_id = seed_downloading_episode(&state).await;

    let harness = start_pump(state).await;
    harness.state.channel.publish("not json at all".to_string());
    harness.state.channel.publish(r#"{"wrong": "shape"}"#.to_string());
    harness
        .state
        .channel
        .publish_signal(&ProgressSignal {
            episode_ids: vec![episode_id],
        });

    wait_for_envelopes(&harness.collected, 1).await;
    assert_eq!(
        harness.collected.lock().unwrap().len(),
        1,
        "only the valid signal produces an envelope"
    );
    harness.cancel.cancel();
    harness.handle.await.unwrap();
}

#[tokio::test]
async fn cancellation_stops_the_pump_promptly() {
    let state = test_state().await;
    let harness = start_pump(state).await;

    harness.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), harness.handle)
        .await
        .expect("pump exits within one poll cycle")
        .unwrap();
}
