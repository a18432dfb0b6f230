//! Remote file download

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::errors::{CacheError, CacheResult};
use crate::utils::UrlUtils;

/// Fetches a URL into a local file.
///
/// A 404 must surface as [`CacheError::Http`] with status 404 so the cache
/// can treat it as a soft miss.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> CacheResult<()>;
}

/// reqwest-backed downloader streaming the body straight to disk
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(config: &CacheConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> CacheResult<()> {
        let transport = |source: reqwest::Error| CacheError::Transport {
            url: UrlUtils::obfuscate_credentials(url),
            source,
        };

        debug!("Downloading {}", UrlUtils::obfuscate_credentials(url));
        let response = self.client.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Http {
                status: status.as_u16(),
                url: UrlUtils::obfuscate_credentials(url),
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| CacheError::io(dest, e))?;

        let mut written = 0usize;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk: Bytes = chunk.map_err(transport)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| CacheError::io(dest, e))?;
            written += chunk.len();
        }
        file.flush().await.map_err(|e| CacheError::io(dest, e))?;
        file.sync_all().await.map_err(|e| CacheError::io(dest, e))?;

        trace!("Wrote {} bytes to {}", written, dest.display());
        Ok(())
    }
}
