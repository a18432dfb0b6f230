use async_trait::async_trait;
use plugin_db::cache::{ContentCache, Downloader, cache_file_name};
use plugin_db::errors::CacheResult;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Writes a fixed body after a short pause and counts calls
#[derive(Default)]
struct SlowDownloader {
    calls: AtomicUsize,
}

#[async_trait]
impl Downloader for SlowDownloader {
    async fn download(&self, _url: &str, dest: &Path) -> CacheResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::fs::write(dest, b"cover").await.unwrap();
        Ok(())
    }
}

/// Two caches over the same directory share one lock and one copy
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instances_on_same_directory_download_once() {
    let dir = TempDir::new().unwrap();
    let downloader = Arc::new(SlowDownloader::default());
    let first = Arc::new(ContentCache::new(dir.path(), downloader.clone()));
    let second = Arc::new(ContentCache::new(dir.path(), downloader.clone()));
    let url = "https://images.example.com/covers/42.jpg";

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let cache = if i % 2 == 0 { first.clone() } else { second.clone() };
            tokio::spawn(async move { cache.fetch(url, 0).await })
        })
        .collect();

    let mut paths = Vec::new();
    for task in tasks {
        paths.push(task.await.unwrap().unwrap().unwrap());
    }

    assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(std::fs::read(&paths[0]).unwrap(), b"cover");
}

/// The cache path depends only on the URL
#[test]
fn test_cache_path_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let downloader = Arc::new(SlowDownloader::default());
    let first = ContentCache::new(dir.path(), downloader.clone());
    let second = ContentCache::new(dir.path(), downloader);
    let url = "https://images.example.com/covers/42.png?size=large";

    let path = first.cache_path_for(url).unwrap();
    assert_eq!(path, second.cache_path_for(url).unwrap());
    assert_eq!(path, dir.path().join(cache_file_name(url).unwrap()));
    assert!(path.to_string_lossy().ends_with(".png"));
    assert_ne!(path, first.cache_path_for("https://images.example.com/covers/43.png").unwrap());
}

/// Evicting through one instance is visible to the other
#[tokio::test]
async fn test_evict_then_refetch() {
    let dir = TempDir::new().unwrap();
    let downloader = Arc::new(SlowDownloader::default());
    let first = ContentCache::new(dir.path(), downloader.clone());
    let second = ContentCache::new(dir.path(), downloader.clone());
    let url = "https://images.example.com/covers/7.jpg";

    first.fetch(url, 0).await.unwrap();
    assert!(second.is_cached(url));

    assert!(second.evict(url).await);
    assert!(!first.is_cached(url));

    first.fetch(url, 0).await.unwrap();
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 2);
}
