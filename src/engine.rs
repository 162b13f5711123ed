use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};

use crate::error::{AuthError, DownloadError, IntegrityError, LauncherError};
use crate::progress::DownloadProgress;
use crate::version::{InstalledVersionRecord, VersionDescriptor};

/// Name of the installed payload inside the install directory.
pub const PACKAGE_NAME: &str = "game.pak";

/// Minimum spacing between progress callbacks. Chunks arrive far more often
/// than the consumer wants to hear about them.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Streams a release payload into a staging file, verifies its digest and
/// atomically places it into the install directory.
///
/// When the staging directory lives on the same filesystem as the install
/// root the final placement is a single atomic rename; otherwise it
/// degrades to a copy of the already-verified staged file.
pub struct DownloadEngine {
    staging_dir: PathBuf,
}

impl DownloadEngine {
    pub fn new(staging_dir: PathBuf) -> Self {
        DownloadEngine { staging_dir }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn staging_path(&self, descriptor: &VersionDescriptor) -> PathBuf {
        let safe: String = descriptor
            .version_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.staging_dir.join(format!("{safe}.part"))
    }

    /// Contract: the install path is never written directly, progress is
    /// reported at a bounded cadence, and nothing lands in
    /// `destination_dir` unless the SHA-256 of the staged bytes matches
    /// `descriptor.content_digest`. Cancellation deletes the staged file
    /// and surfaces as `DownloadError::Cancelled`.
    ///
    /// `request` must already carry the session's bearer credential; a
    /// 401-class response here means the token expired server-side.
    pub async fn fetch_and_install<F>(
        &self,
        descriptor: &VersionDescriptor,
        request: reqwest::RequestBuilder,
        destination_dir: &Path,
        cancel: Arc<AtomicBool>,
        mut on_progress: F,
    ) -> Result<InstalledVersionRecord, LauncherError>
    where
        F: FnMut(DownloadProgress),
    {
        let staged = self.staging_path(descriptor);
        let result = self
            .stream_to_staging(descriptor, request, &staged, cancel, &mut on_progress)
            .await;

        if let Err(e) = result {
            // A failed or cancelled transfer never leaves a partial artifact.
            let _ = std::fs::remove_file(&staged);
            log::info!("discarded staged download {}", staged.display());
            return Err(e);
        }

        std::fs::create_dir_all(destination_dir).map_err(DownloadError::Io)?;
        let final_path = destination_dir.join(PACKAGE_NAME);
        if let Err(e) = std::fs::rename(&staged, &final_path) {
            // Rename cannot cross filesystems (an overridden install dir may
            // sit on another mount) and on Windows cannot replace an
            // existing payload. Fall back to copy + delete.
            log::warn!(
                "rename into {} failed ({e}); copying instead",
                final_path.display()
            );
            std::fs::copy(&staged, &final_path).map_err(DownloadError::Io)?;
            let _ = std::fs::remove_file(&staged);
        }

        log::info!(
            "installed version {} at {}",
            descriptor.version_id,
            final_path.display()
        );

        Ok(InstalledVersionRecord {
            version_id: descriptor.version_id.clone(),
            install_path: destination_dir.to_path_buf(),
            verified_at: SystemTime::now(),
        })
    }

    async fn stream_to_staging<F>(
        &self,
        descriptor: &VersionDescriptor,
        request: reqwest::RequestBuilder,
        staged: &Path,
        cancel: Arc<AtomicBool>,
        on_progress: &mut F,
    ) -> Result<(), LauncherError>
    where
        F: FnMut(DownloadProgress),
    {
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::NetworkInterrupted(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // Token expired or revoked server-side; the caller must re-login.
            return Err(AuthError::Unauthenticated.into());
        }
        if !status.is_success() {
            return Err(DownloadError::NetworkInterrupted(format!(
                "download returned status {status}"
            ))
            .into());
        }

        let total = response.content_length().unwrap_or(descriptor.size_bytes);

        std::fs::create_dir_all(&self.staging_dir).map_err(DownloadError::Io)?;
        let mut file = File::create(staged).map_err(DownloadError::Io)?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut last_emit = Instant::now();
        let mut bytes_since_emit: u64 = 0;

        on_progress(DownloadProgress::starting(total));

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if cancel.load(Ordering::Relaxed) {
                return Err(DownloadError::Cancelled.into());
            }
            let chunk = chunk.map_err(|e| DownloadError::NetworkInterrupted(e.to_string()))?;
            file.write_all(&chunk).map_err(DownloadError::Io)?;
            hasher.update(&chunk);
            downloaded = downloaded.saturating_add(chunk.len() as u64);
            bytes_since_emit = bytes_since_emit.saturating_add(chunk.len() as u64);

            let elapsed = last_emit.elapsed();
            if elapsed >= PROGRESS_INTERVAL {
                on_progress(DownloadProgress {
                    bytes_transferred: downloaded,
                    bytes_total: total,
                    rate_bytes_per_sec: bytes_since_emit as f64 / elapsed.as_secs_f64(),
                });
                last_emit = Instant::now();
                bytes_since_emit = 0;
            }
        }
        file.flush().map_err(DownloadError::Io)?;
        drop(file);

        if cancel.load(Ordering::Relaxed) {
            return Err(DownloadError::Cancelled.into());
        }

        // Final tick so consumers always see the transfer land on 100%.
        on_progress(DownloadProgress {
            bytes_transferred: downloaded,
            bytes_total: total,
            rate_bytes_per_sec: 0.0,
        });

        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(&descriptor.content_digest) {
            log::error!(
                "digest mismatch for {}: expected {}, got {actual}",
                descriptor.version_id,
                descriptor.content_digest
            );
            return Err(IntegrityError::ChecksumMismatch {
                expected: descriptor.content_digest.clone(),
                actual,
            }
            .into());
        }

        Ok(())
    }
}
