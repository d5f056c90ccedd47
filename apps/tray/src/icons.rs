//! Remote icon loading with a process-wide cache.

use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Icon bytes keyed by URL. Entries are never invalidated.
#[derive(Debug, Default)]
pub struct IconCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl IconCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached bytes for `url`, fetching them on a miss.
    ///
    /// The lock is held across the fetch so concurrent callers never fetch the
    /// same URL twice. Failed fetches and empty bodies are not cached.
    pub async fn get_or_fetch(&self, url: &str, source: &dyn IconSource) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().await;
        if let Some(bytes) = entries.get(url) {
            return Some(bytes.clone());
        }

        match source.fetch(url).await {
            Ok(bytes) if !bytes.is_empty() => {
                debug!(url, size = bytes.len(), "icon cached");
                entries.insert(url.to_string(), bytes.clone());
                Some(bytes)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(url, error = %format!("{err:#}"), "failed to fetch icon");
                None
            }
        }
    }
}

#[async_trait]
pub trait IconSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpIconSource {
    http: reqwest::Client,
}

impl HttpIconSource {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpIconSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IconSource for HttpIconSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("requesting icon {url}"))?
            .error_for_status()
            .with_context(|| format!("icon {url} returned an error status"))?;
        let bytes = res.bytes().await.context("reading icon body")?;
        Ok(bytes.to_vec())
    }
}

/// Icon source plus cache, shared by every menu generation.
#[derive(Clone)]
pub struct RemoteIcons {
    source: Arc<dyn IconSource>,
    cache: Arc<IconCache>,
}

impl RemoteIcons {
    pub fn new(source: Arc<dyn IconSource>) -> Self {
        Self {
            source,
            cache: Arc::new(IconCache::new()),
        }
    }

    /// Bytes for `url`, or `None` when the URL is empty or the fetch failed.
    pub async fn load(&self, url: &str) -> Option<Vec<u8>> {
        if url.is_empty() {
            return None;
        }
        self.cache.get_or_fetch(url, self.source.as_ref()).await
    }
}

#[cfg(test)]
#[path = "tests/icons_tests.rs"]
mod tests;
