//! ffmpeg post-processing for episode audio and cover images.
//!
//! Episode audio from streaming providers carries broken duration metadata;
//! one normalization pass through libmp3lame fixes it. Covers are scaled to
//! a fixed width. Both run the external `ffmpeg` binary under a hard
//! wall-clock timeout.
//!
//! While ffmpeg runs, a cooperative watcher task polls the output file size
//! on a timer and feeds the byte-progress hook. The watcher is an in-process
//! tokio task guarded by a cancellation token, so it can never outlive the
//! transcoding step.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::TranscodeConfig;
use crate::error::TranscodeError;
use crate::provider::ProgressHook;

/// Default ffmpeg arguments normalizing audio to mp3
const AUDIO_ARGS: &[&str] = &["-vn", "-acodec", "libmp3lame", "-q:a", "5"];

/// ffmpeg arguments scaling cover images to 600px width
const IMAGE_ARGS: &[&str] = &["-vf", "scale=600:-1"];

/// External transcoder wrapping the ffmpeg binary
pub struct Transcoder {
    binary_path: PathBuf,
    timeout: Duration,
    watch_interval: Duration,
}

impl Transcoder {
    /// Create a transcoder from configuration, discovering ffmpeg in PATH
    /// when no explicit path is set
    pub fn from_config(config: &TranscodeConfig) -> Result<Self, TranscodeError> {
        let binary_path = match &config.ffmpeg_path {
            Some(path) => path.clone(),
            None => which::which("ffmpeg")
                .map_err(|e| TranscodeError::BinaryNotFound(format!("ffmpeg: {}", e)))?,
        };
        Ok(Self {
            binary_path,
            timeout: config.timeout,
            watch_interval: config.watch_interval,
        })
    }

    /// Normalize an audio file in place, reporting byte progress
    pub async fn normalize_audio(
        &self,
        src: &Path,
        hook: ProgressHook,
    ) -> Result<(), TranscodeError> {
        self.run_in_place(src, AUDIO_ARGS, Some(hook)).await
    }

    /// Scale a cover image in place
    pub async fn scale_image(&self, src: &Path) -> Result<(), TranscodeError> {
        self.run_in_place(src, IMAGE_ARGS, None).await
    }

    /// Run ffmpeg `src -> tmp_<name>` and atomically replace the source on
    /// success; partial output is removed on every failure path
    async fn run_in_place(
        &self,
        src: &Path,
        args: &[&str],
        hook: Option<ProgressHook>,
    ) -> Result<(), TranscodeError> {
        let filename = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = src.with_file_name(format!("tmp_{}", filename));
        let total_bytes = tokio::fs::metadata(src).await.map(|m| m.len()).unwrap_or(0);

        tracing::info!(file = %filename, "Starting ffmpeg preparation");
        if let Some(hook) = &hook {
            hook(0, total_bytes);
        }

        // Watcher: cooperative timer task observing in-progress output size.
        // The drop guard cancels it on every exit path of this function.
        let watch_token = CancellationToken::new();
        let _watch_guard = watch_token.clone().drop_guard();
        if let Some(hook) = hook.clone() {
            let watched_path = tmp_path.clone();
            let interval_duration = self.watch_interval;
            let token = watch_token.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(interval_duration);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            if let Ok(meta) = tokio::fs::metadata(&watched_path).await {
                                hook(meta.len(), total_bytes);
                            }
                        }
                    }
                }
            });
        }

        let child = Command::new(&self.binary_path)
            .arg("-y")
            .arg("-i")
            .arg(src)
            .args(args)
            .arg(&tmp_path)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeError::CommandFailed {
                path: src.to_path_buf(),
                details: format!("failed to spawn ffmpeg: {}", e),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                remove_quietly(&tmp_path).await;
                return Err(TranscodeError::CommandFailed {
                    path: src.to_path_buf(),
                    details: format!("failed to wait for ffmpeg: {}", e),
                });
            }
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped
                remove_quietly(&tmp_path).await;
                return Err(TranscodeError::Timeout {
                    path: src.to_path_buf(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            remove_quietly(&tmp_path).await;
            let stderr_tail = String::from_utf8_lossy(&output.stderr)
                .lines()
                .rev()
                .take(5)
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(TranscodeError::CommandFailed {
                path: src.to_path_buf(),
                details: format!("ffmpeg exited with {}: {}", output.status, stderr_tail),
            });
        }

        // Atomic replacement of the source with the transcoded result
        if tokio::fs::metadata(&tmp_path).await.is_err() {
            return Err(TranscodeError::OutputMissing {
                path: tmp_path.clone(),
                details: "ffmpeg reported success but produced no output".to_string(),
            });
        }
        tokio::fs::rename(&tmp_path, src)
            .await
            .map_err(|e| TranscodeError::OutputMissing {
                path: tmp_path.clone(),
                details: format!("failed to replace source file: {}", e),
            })?;

        let final_size = tokio::fs::metadata(src).await.map(|m| m.len()).unwrap_or(0);
        if let Some(hook) = &hook {
            hook(final_size, final_size);
        }
        tracing::info!(file = %filename, bytes = final_size, "ffmpeg preparation done");
        Ok(())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn test_transcoder(binary: &Path) -> Transcoder {
        Transcoder {
            binary_path: binary.to_path_buf(),
            timeout: Duration::from_secs(5),
            watch_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn failed_command_removes_partial_output_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("input.mp3");
        tokio::fs::write(&src, b"not really audio").await.unwrap();

        // `false` ignores its arguments and exits 1
        let transcoder = test_transcoder(Path::new("/bin/false"));
        let err = transcoder
            .normalize_audio(&src, Arc::new(|_, _| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::CommandFailed { .. }));
        assert!(!dir.path().join("tmp_input.mp3").exists());
        assert!(src.exists(), "source must survive a failed attempt");
    }

    #[tokio::test]
    async fn timeout_is_reported_as_timeout_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("input.mp3");
        tokio::fs::write(&src, b"bytes").await.unwrap();

        let transcoder = Transcoder {
            binary_path: PathBuf::from("/bin/sleep"),
            timeout: Duration::from_millis(50),
            watch_interval: Duration::from_millis(10),
        };
        // sleep ignores the ffmpeg-style arguments and blocks past the timeout
        let err = transcoder
            .scale_image(&src)
            .await
            .unwrap_err();
        match err {
            TranscodeError::Timeout { timeout_secs, .. } => assert_eq!(timeout_secs, 0),
            TranscodeError::CommandFailed { .. } => {
                // sleep may reject the arguments before the timeout fires on
                // some platforms; both outcomes terminate the attempt
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!dir.path().join("tmp_input.mp3").exists());
    }

    #[tokio::test]
    async fn success_replaces_source_and_reports_final_size() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("input.mp3");
        tokio::fs::write(&src, b"original").await.unwrap();

        // Stand-in for ffmpeg ("-y -i <src> ... <tmp>"): a tiny shell wrapper
        // that copies the input to the last argument.
        let script = dir.path().join("fake-ffmpeg.sh");
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

        let reported = Arc::new(AtomicU64::new(0));
        let reported_clone = reported.clone();
        let transcoder = test_transcoder(&script);
        transcoder
            .normalize_audio(
                &src,
                Arc::new(move |processed, _| {
                    reported_clone.store(processed, Ordering::Relaxed);
                }),
            )
            .await
            .unwrap();

        assert!(src.exists());
        assert!(!dir.path().join("tmp_input.mp3").exists());
        assert_eq!(
            reported.load(Ordering::Relaxed),
            tokio::fs::metadata(&src).await.unwrap().len(),
            "final hook call reports the finished size"
        );
    }
}
