use crate::cache::{CacheEntry, ContentCache};
use crate::error::{Error, Result};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

const USER_AGENT: &str = concat!("phpvm/", env!("CARGO_PKG_VERSION"));
const UPDATE_INTERVAL: Duration = Duration::from_millis(100);
const CHUNK_SIZE: usize = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// One progress snapshot of an in-flight (or cache-served) download.
#[derive(Debug, Clone)]
pub struct Progress {
    pub downloaded: u64,
    pub total: u64,
    pub bytes_per_sec: f64,
    pub percent: u64,
    pub from_cache: bool,
}

/// Producer end of the progress stream. Emission is fire-and-forget: a slow
/// or vanished consumer never stalls the download.
pub type ProgressSender = Sender<Progress>;

/// Streams remote archives into the content cache, reusing cache hits and
/// verifying integrity before anything is published.
pub struct Downloader {
    client: reqwest::blocking::Client,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        Self::with_read_timeout(READ_TIMEOUT)
    }

    /// No whole-request timeout (large archives on slow links take as long
    /// as they take), but a stalled read gives up and surfaces as
    /// [`Error::Transfer`].
    fn with_read_timeout(read_timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::ClientBuilder::from(
            reqwest::ClientBuilder::new()
                .user_agent(USER_AGENT)
                .connect_timeout(Duration::from_secs(30))
                .read_timeout(read_timeout),
        )
        .timeout(None)
        .build()
        .map_err(|e| Error::Transfer(e.to_string()))?;
        Ok(Downloader { client })
    }

    /// Resolves `url` to a cached archive. With a matching cache entry the
    /// network is never touched: a single 100% progress event is emitted,
    /// flagged as served from cache. Otherwise the body is streamed into a
    /// cache insert and finalized only after the full stream (and expected
    /// checksum, when given) validated.
    pub fn fetch(
        &self,
        cache: &ContentCache,
        url: &str,
        expected_hash: Option<&str>,
        progress: Option<&ProgressSender>,
        cancel: Option<&AtomicBool>,
    ) -> Result<(std::path::PathBuf, CacheEntry)> {
        if let Some(hash) = expected_hash {
            if cache.verify(hash)? {
                let path = cache.path_for(hash);
                let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                emit(
                    progress,
                    Progress {
                        downloaded: size,
                        total: size,
                        bytes_per_sec: 0.0,
                        percent: 100,
                        from_cache: true,
                    },
                );
                tracing::debug!(url, hash, "serving archive from cache");
                let entry = CacheEntry {
                    hash: hash.to_string(),
                    size,
                    modified: std::fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
                };
                return Ok((path, entry));
            }
        }

        // A cancelled operation never starts the request.
        if is_cancelled(cancel) {
            return Err(Error::Cancelled);
        }

        tracing::info!(url, "downloading");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::Transfer(format!("request to {} failed: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transfer(format!("HTTP {} from {}", status, url)));
        }

        let total = response.content_length().unwrap_or(0);
        let mut body = response;
        let mut writer = cache.begin()?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut downloaded: u64 = 0;
        let mut last_update = Instant::now();
        let mut last_downloaded = 0u64;

        loop {
            if is_cancelled(cancel) {
                // Writer drop discards the temp file; nothing was published.
                return Err(Error::Cancelled);
            }
            let n = body
                .read(&mut buffer)
                .map_err(|e| Error::Transfer(format!("stream from {} broke: {}", url, e)))?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n])?;
            downloaded += n as u64;

            let now = Instant::now();
            if now.duration_since(last_update) >= UPDATE_INTERVAL
                || (total > 0 && downloaded == total)
            {
                let elapsed = now.duration_since(last_update).as_secs_f64();
                let bytes_per_sec = if elapsed > 0.0 {
                    (downloaded - last_downloaded) as f64 / elapsed
                } else {
                    0.0
                };
                emit(
                    progress,
                    Progress {
                        downloaded,
                        total,
                        bytes_per_sec,
                        percent: percent_of(downloaded, total),
                        from_cache: false,
                    },
                );
                last_update = now;
                last_downloaded = downloaded;
            }
        }

        let entry = writer.finish(expected_hash)?;
        tracing::info!(url, hash = %entry.hash, bytes = downloaded, "download complete");
        emit(
            progress,
            Progress {
                downloaded,
                total: if total > 0 { total } else { downloaded },
                bytes_per_sec: 0.0,
                percent: 100,
                from_cache: false,
            },
        );
        Ok((cache.path_for(&entry.hash), entry))
    }
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.map(|flag| flag.load(Ordering::Relaxed)).unwrap_or(false)
}

fn emit(progress: Option<&ProgressSender>, event: Progress) {
    if let Some(sender) = progress {
        let _ = sender.send(event);
    }
}

fn percent_of(downloaded: u64, total: u64) -> u64 {
    if total > 0 { downloaded * 100 / total } else { 0 }
}
