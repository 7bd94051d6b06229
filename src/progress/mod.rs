//! Progress channel and per-episode progress tracking.
//!
//! The pipeline's I/O callbacks write ephemeral `{stage, total, processed}`
//! records keyed by episode id; reporting reads them back and the channel
//! broadcasts "progress changed" signals to streaming clients.
//!
//! The channel mirrors a Redis-style collaborator: pub/sub carries opaque
//! JSON payloads (consumers must tolerate malformed ones), and the key-value
//! side expires entries after a TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::types::{EpisodeId, Progress, ProgressSignal, ProgressStage};

pub mod report;

/// Capacity of the pub/sub broadcast channel
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process pub/sub plus TTL key-value cache
///
/// Cloneable handle; all clones share the same channel and cache. Injected
/// into the pipeline context and the progress API.
#[derive(Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<String>,
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl ProgressChannel {
    /// Create a new channel
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish a raw message to all subscribers
    ///
    /// Messages are opaque JSON strings, so consumers must treat decoding
    /// failures as non-fatal.
    pub fn publish(&self, message: String) {
        // No receivers is fine: nobody is watching right now
        let _ = self.sender.send(message);
    }

    /// Publish a typed progress signal
    pub fn publish_signal(&self, signal: &ProgressSignal) {
        match serde_json::to_string(signal) {
            Ok(message) => self.publish(message),
            Err(e) => tracing::error!(error = %e, "Failed to encode progress signal"),
        }
    }

    /// Subscribe to the signal stream
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Store a value under a key with a TTL
    pub fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    /// Fetch a value; expired entries are dropped on read
    pub fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remove a key
    pub fn remove(&self, key: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(key);
        }
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer/reader for ephemeral per-episode progress records
///
/// Records live in the channel's TTL cache so they vanish on their own once
/// the download finishes or dies.
#[derive(Clone)]
pub struct ProgressTracker {
    channel: ProgressChannel,
    record_ttl: Duration,
}

impl ProgressTracker {
    /// Create a tracker writing through the given channel
    pub fn new(channel: ProgressChannel, record_ttl: Duration) -> Self {
        Self {
            channel,
            record_ttl,
        }
    }

    fn key(episode_id: EpisodeId) -> String {
        format!("progress:{}", episode_id)
    }

    /// Record the current stage and byte counters for an episode
    pub fn set(&self, episode_id: EpisodeId, progress: Progress) {
        match serde_json::to_string(&progress) {
            Ok(value) => self.channel.set(&Self::key(episode_id), value, self.record_ttl),
            Err(e) => tracing::error!(episode_id = %episode_id, error = %e, "Failed to encode progress"),
        }
    }

    /// Convenience: record a stage change with byte counters
    pub fn set_stage(
        &self,
        episode_id: EpisodeId,
        stage: ProgressStage,
        total_bytes: u64,
        processed_bytes: u64,
    ) {
        self.set(
            episode_id,
            Progress {
                stage,
                total_bytes,
                processed_bytes,
            },
        );
    }

    /// Read the current record, if any is still live
    pub fn get(&self, episode_id: EpisodeId) -> Option<Progress> {
        let raw = self.channel.get(&Self::key(episode_id))?;
        match serde_json::from_str(&raw) {
            Ok(progress) => Some(progress),
            Err(e) => {
                tracing::warn!(episode_id = %episode_id, error = %e, "Discarding undecodable progress record");
                None
            }
        }
    }

    /// Drop the record for an episode
    pub fn clear(&self, episode_id: EpisodeId) {
        self.channel.remove(&Self::key(episode_id));
    }

    /// Broadcast that progress changed for the given episodes
    pub fn signal(&self, episode_ids: Vec<EpisodeId>) {
        self.channel.publish_signal(&ProgressSignal { episode_ids });
    }
}
