//! Response cache: one interface, a process-local map and a SQL-backed shared store.

mod fingerprint;
mod local;
mod sql;

pub use fingerprint::fingerprint;
pub use local::LocalCache;
pub use sql::SqlCache;

use crate::settings::CacheSettings;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("cache: {0}")]
    Other(String),
}

#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// `ttl` of `None` keeps the entry until deleted.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`. Returns the number removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    /// Delete `keys` and sweep `prefix` in the background. The sweep is not ordered
    /// against later reads; a reader may see a stale entry until it completes.
    fn invalidate(self: Arc<Self>, prefix: String, keys: Vec<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            for key in &keys {
                if let Err(e) = self.delete(key).await {
                    tracing::warn!(key = %key, error = %e, "cache delete failed");
                }
            }
            match self.delete_prefix(&prefix).await {
                Ok(n) => tracing::debug!(prefix = %prefix, removed = n, "cache invalidated"),
                Err(e) => tracing::warn!(prefix = %prefix, error = %e, "cache sweep failed"),
            }
        })
    }
}

/// Build the configured cache. A shared store that cannot be reached at startup degrades
/// once to the local map. `None` when caching is disabled.
pub async fn connect(settings: &CacheSettings) -> Option<Arc<dyn Cache>> {
    if !settings.enabled {
        return None;
    }
    if settings.url.is_empty() {
        return Some(Arc::new(LocalCache::new()));
    }
    match SqlCache::connect(&settings.url).await {
        Ok(store) => {
            tracing::info!("shared response cache connected");
            Some(Arc::new(store))
        }
        Err(e) => {
            tracing::warn!(error = %e, "shared cache unavailable, using local cache");
            Some(Arc::new(LocalCache::new()))
        }
    }
}
