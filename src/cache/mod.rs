//! Content-addressed remote file cache
//!
//! [`ContentCache`] maps a remote URL to a file under one cache directory,
//! named by [`key::cache_file_name`]. A URL is downloaded at most once until
//! it is evicted. Downloads land in a `.part` file beside the final path and
//! are renamed into place when complete, so a cached path is either absent or
//! a whole non-empty file.
//!
//! Fetch, evict and clear on the same directory are serialized by one
//! process-wide lock per directory, shared by every `ContentCache` pointing
//! there.

pub mod download;
pub mod key;
pub mod resize;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use tracing::{debug, error, info};

use crate::errors::{CacheError, CacheResult};
use crate::utils::UrlUtils;

pub use download::{Downloader, HttpDownloader};
pub use key::cache_file_name;

const PART_SUFFIX: &str = "part";

type DirLock = Arc<tokio::sync::Mutex<()>>;

static DIRECTORY_LOCKS: LazyLock<Mutex<HashMap<PathBuf, DirLock>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn directory_lock(dir: &Path) -> DirLock {
    DIRECTORY_LOCKS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .entry(dir.to_path_buf())
        .or_default()
        .clone()
}

fn is_complete(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn part_path(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.{tag}.{PART_SUFFIX}"))
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}

pub struct ContentCache {
    dir: PathBuf,
    downloader: Arc<dyn Downloader>,
    lock: DirLock,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>, downloader: Arc<dyn Downloader>) -> Self {
        let dir = dir.into();
        let lock = directory_lock(&dir);
        Self {
            dir,
            downloader,
            lock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `url` is (or would be) cached. Does not touch the disk.
    pub fn cache_path_for(&self, url: &str) -> CacheResult<PathBuf> {
        Ok(self.dir.join(cache_file_name(url)?))
    }

    /// True when there is nothing to fetch (empty or non-HTTP url) or the
    /// file is already cached
    pub fn is_cached(&self, url: &str) -> bool {
        if url.trim().is_empty() || !UrlUtils::is_http_url(url) {
            return true;
        }
        self.cache_path_for(url)
            .map(|path| is_complete(&path))
            .unwrap_or(true)
    }

    /// Local path of `url`, downloading it first if needed.
    ///
    /// With `resize > 0` the image is shrunk to fit `resize`x`resize`. An
    /// empty or non-HTTP url and a remote 404 yield `Ok(None)`; any other
    /// failure is returned, including an empty download, which is never
    /// cached.
    pub async fn fetch(&self, url: &str, resize: u32) -> CacheResult<Option<PathBuf>> {
        if url.trim().is_empty() {
            return Ok(None);
        }
        if !UrlUtils::is_http_url(url) {
            debug!("Not an HTTP url, nothing to fetch: {}", url);
            return Ok(None);
        }
        let path = self.cache_path_for(url)?;

        let _guard = self.lock.lock().await;
        if is_complete(&path) {
            debug!("Returning {} from file cache {}", UrlUtils::obfuscate_credentials(url), path.display());
            return Ok(Some(path));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;

        let download = part_path(&path, "download");
        match self.downloader.download(url, &download).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                remove_quietly(&download).await;
                debug!("{} not found remotely", UrlUtils::obfuscate_credentials(url));
                return Ok(None);
            }
            Err(e) => {
                remove_quietly(&download).await;
                return Err(e);
            }
        }

        let staged = if resize > 0 {
            let resized = part_path(&path, "resize");
            let (src, dest) = (download.clone(), resized.clone());
            let result =
                tokio::task::spawn_blocking(move || resize::resize_to_fit(&src, &dest, resize))
                    .await;
            remove_quietly(&download).await;
            match result {
                Ok(Ok(())) => resized,
                Ok(Err(e)) => {
                    remove_quietly(&resized).await;
                    return Err(e);
                }
                Err(e) => {
                    remove_quietly(&resized).await;
                    return Err(e.into());
                }
            }
        } else {
            download
        };

        if !is_complete(&staged) {
            remove_quietly(&staged).await;
            return Err(CacheError::EmptyFile {
                url: UrlUtils::obfuscate_credentials(url),
            });
        }

        if let Err(e) = tokio::fs::rename(&staged, &path).await {
            remove_quietly(&staged).await;
            return Err(CacheError::io(&path, e));
        }

        debug!("Cached {} at {}", UrlUtils::obfuscate_credentials(url), path.display());
        Ok(Some(path))
    }

    /// Delete the cached file for `url`. Failures are logged, not returned.
    pub async fn evict(&self, url: &str) -> bool {
        if url.trim().is_empty() {
            return false;
        }
        let Ok(path) = self.cache_path_for(url) else {
            return false;
        };

        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {} from file cache", UrlUtils::obfuscate_credentials(url));
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                error!("Failed to remove {} from cache: {}", UrlUtils::obfuscate_credentials(url), e);
                false
            }
        }
    }

    /// Delete every cached file, returning how many were removed
    pub async fn clear(&self) -> CacheResult<usize> {
        let _guard = self.lock.lock().await;

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| CacheError::io(&path, e))?;
            removed += 1;
        }

        info!("Cleared {} files from {}", removed, self.dir.display());
        Ok(removed)
    }
}
