//! Shared fixtures for pipeline tests: in-memory collaborators and seed data.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Config;
use crate::db::{Database, FileUpdate, NewCookie, NewEpisode, NewFile, NewPodcast};
use crate::error::ProviderError;
use crate::progress::{ProgressChannel, ProgressTracker};
use crate::provider::{MediaProvider, ProgressHook};
use crate::storage::{ObjectMeta, ObjectStorage, StorageCode, remote_path};
use crate::transcode::Transcoder;
use crate::types::{EpisodeId, PodcastId, SourceType};

use super::TaskContext;

/// In-memory object store with scripted failures and a call log
pub(crate) struct MockStorage {
    objects: Mutex<HashMap<String, i64>>,
    calls: Mutex<Vec<String>>,
    /// Number of upcoming uploads that will fail
    fail_uploads: AtomicU32,
    fail_copies: AtomicBool,
}

impl MockStorage {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_uploads: AtomicU32::new(0),
            fail_copies: AtomicBool::new(false),
        })
    }

    pub(crate) fn put_object(&self, path: &str, size: i64) {
        self.objects.lock().unwrap().insert(path.to_string(), size);
    }

    pub(crate) fn object_size(&self, path: &str) -> Option<i64> {
        self.objects.lock().unwrap().get(path).copied()
    }

    pub(crate) fn fail_next_uploads(&self, count: u32) {
        self.fail_uploads.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_copies(&self) {
        self.fail_copies.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_matching(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_upload_failure(&self) -> bool {
        self.fail_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStorage for MockStorage {
    async fn upload(
        &self,
        local_path: &Path,
        remote_dir: &str,
        filename: Option<&str>,
    ) -> Option<String> {
        let name = match filename {
            Some(name) => name.to_string(),
            None => local_path.file_name()?.to_string_lossy().into_owned(),
        };
        let dst = remote_path(remote_dir, &name);
        self.record(format!("upload:{}", dst));

        if self.take_upload_failure() {
            return None;
        }
        let size = tokio::fs::metadata(local_path)
            .await
            .map(|m| m.len() as i64)
            .unwrap_or(0);
        self.put_object(&dst, size);
        Some(dst)
    }

    async fn copy(&self, src_path: &str, dst_path: &str) -> Option<String> {
        self.record(format!("copy:{}->{}", src_path, dst_path));
        if self.fail_copies.load(Ordering::SeqCst) {
            return None;
        }
        let size = self.object_size(src_path)?;
        self.put_object(dst_path, size);
        Some(dst_path.to_string())
    }

    async fn delete(&self, remote_path: &str) -> StorageCode {
        self.record(format!("delete:{}", remote_path));
        self.objects.lock().unwrap().remove(remote_path);
        StorageCode::Ok
    }

    async fn head(&self, remote_path: &str) -> Option<ObjectMeta> {
        let size = self.object_size(remote_path)?;
        Some(ObjectMeta { size, etag: None })
    }
}

/// Provider stub writing canned bytes instead of calling yt-dlp
pub(crate) struct MockProvider {
    audio_bytes: Vec<u8>,
    fail_audio: AtomicBool,
    cover_not_found: AtomicBool,
    fetch_calls: AtomicU32,
    /// Contents of the cookie file handed to the latest fetch, if any
    seen_cookie: Mutex<Option<String>>,
}

impl MockProvider {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            audio_bytes: b"mock audio bytes".to_vec(),
            fail_audio: AtomicBool::new(false),
            cover_not_found: AtomicBool::new(false),
            fetch_calls: AtomicU32::new(0),
            seen_cookie: Mutex::new(None),
        })
    }

    pub(crate) fn fail_audio(&self) {
        self.fail_audio.store(true, Ordering::SeqCst);
    }

    pub(crate) fn cover_not_found(&self) {
        self.cover_not_found.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn audio_len(&self) -> i64 {
        self.audio_bytes.len() as i64
    }

    pub(crate) fn seen_cookie(&self) -> Option<String> {
        self.seen_cookie.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaProvider for MockProvider {
    async fn fetch_audio(
        &self,
        _watch_url: &str,
        source_id: &str,
        dest: &Path,
        cookie_file: Option<&Path>,
        hook: ProgressHook,
    ) -> Result<(), ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_cookie.lock().unwrap() = match cookie_file {
            Some(path) => tokio::fs::read_to_string(path).await.ok(),
            None => None,
        };
        if self.fail_audio.load(Ordering::SeqCst) {
            return Err(ProviderError::FetchFailed {
                source_id: source_id.to_string(),
                details: "scripted failure".to_string(),
            });
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(dest, &self.audio_bytes).await.unwrap();
        let len = self.audio_bytes.len() as u64;
        hook(len, len);
        Ok(())
    }

    async fn fetch_cover(&self, _image_url: &str, dest: &Path) -> Result<(), ProviderError> {
        if self.cover_not_found.load(Ordering::SeqCst) {
            return Err(ProviderError::NotFound("scripted 404".to_string()));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(dest, b"mock cover bytes").await.unwrap();
        Ok(())
    }
}

/// Everything a pipeline test needs, with the temp dir kept alive
pub(crate) struct TestContext {
    pub ctx: TaskContext,
    pub storage: Arc<MockStorage>,
    pub provider: Arc<MockProvider>,
    _dir: tempfile::TempDir,
}

/// Write a shell script standing in for ffmpeg: copies the input file
/// (third argument, after `-y -i`) to the output (last argument)
async fn fake_ffmpeg(dir: &Path) -> std::path::PathBuf {
    let script = dir.join("fake-ffmpeg.sh");
    tokio::fs::write(
        &script,
        "#!/bin/sh\nfor last; do :; done\nshift 2\ncp \"$1\" \"$last\"\n",
    )
    .await
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
            .await
            .unwrap();
    }
    script
}

pub(crate) async fn test_context() -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let ffmpeg = fake_ffmpeg(dir.path()).await;

    let config = Config {
        download: crate::config::DownloadConfig {
            tmp_audio_dir: dir.path().join("audio"),
            tmp_images_dir: dir.path().join("images"),
            tmp_rss_dir: dir.path().join("rss"),
            ..Default::default()
        },
        transcode: crate::config::TranscodeConfig {
            ffmpeg_path: Some(ffmpeg),
            timeout: Duration::from_secs(5),
            watch_interval: Duration::from_millis(10),
        },
        cover_retry: crate::config::CoverRetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        },
        ..Default::default()
    };

    let db = Database::in_memory().await.unwrap();
    let storage = MockStorage::new();
    let provider = MockProvider::new();
    let transcoder = Transcoder::from_config(&config.transcode).unwrap();
    let tracker = ProgressTracker::new(ProgressChannel::new(), Duration::from_secs(60));

    let ctx = TaskContext {
        db,
        storage: storage.clone(),
        provider: provider.clone(),
        transcoder: Arc::new(transcoder),
        tracker,
        config: Arc::new(config),
    };

    TestContext {
        ctx,
        storage,
        provider,
        _dir: dir,
    }
}

pub(crate) async fn seed_podcast(db: &Database, publish_id: &str) -> PodcastId {
    db.insert_podcast(&NewPodcast {
        publish_id: publish_id.to_string(),
        name: format!("Podcast {}", publish_id),
        description: Some("test feed".to_string()),
        image_url: Some("https://cdn.example.com/show.jpg".to_string()),
        download_automatically: true,
    })
    .await
    .unwrap()
}

/// Seed an episode with its audio/image file rows; audio files of one source
/// share the source URL, mirroring sibling episodes across podcasts
pub(crate) async fn seed_episode(
    db: &Database,
    podcast_id: PodcastId,
    source_id: &str,
    source_type: SourceType,
) -> EpisodeId {
    seed_episode_with_cookie(db, podcast_id, source_id, source_type, None).await
}

/// Seed an episode with an attached access-cookie record
pub(crate) async fn seed_episode_with_cookie(
    db: &Database,
    podcast_id: PodcastId,
    source_id: &str,
    source_type: SourceType,
    cookie_data: Option<&str>,
) -> EpisodeId {
    let cookie_id = match cookie_data {
        Some(data) => Some(
            db.insert_cookie(&NewCookie {
                source_type,
                data: data.to_string(),
            })
            .await
            .unwrap(),
        ),
        None => None,
    };
    let watch_url = match source_type {
        SourceType::Upload => None,
        _ => Some(format!("https://youtu.be/{}", source_id)),
    };
    let audio = db
        .insert_file(&NewFile {
            source_url: watch_url.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    let image = db
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
        watch_url,
        title: format!("Episode {}", source_id),
        author: Some("Author".to_string()),
        description: Some("About the episode".to_string()),
        audio_file_id: audio,
        image_file_id: image,
        cookie_id,
    })
    .await
    .unwrap()
}

/// Point an episode's audio record at a stored object
pub(crate) async fn attach_audio_object(
    db: &Database,
    storage: &MockStorage,
    episode_id: EpisodeId,
    path: &str,
    size: i64,
) {
    let episode = db.get_episode_required(episode_id).await.unwrap();
    storage.put_object(path, size);
    db.update_file(
        episode.audio_file_id,
        &FileUpdate {
            path: Some(path.to_string()),
            size: Some(size),
            ..Default::default()
        },
    )
    .await
    .unwrap();
}
