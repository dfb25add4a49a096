use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use warden_dns::RecordType;

pub mod memory;
pub mod shared;

pub use memory::MokaBackend;
pub use shared::RedisBackend;

/// Storage behind a [`ResponseCache`].
///
/// `ttl` is in seconds; `0` keeps the entry until it is overwritten.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Establish whatever connection the backend needs. Called once by [`ResponseCache::open`].
    async fn connect(&mut self) -> anyhow::Result<()>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>>;

    async fn set(&self, key: &str, value: Bytes, ttl: u64) -> anyhow::Result<()>;
}

/// Identifies a cached response: the normalized domain plus the query type.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CacheKey {
    pub domain: Arc<str>,
    pub record_type: RecordType,
}

impl CacheKey {
    pub fn new(domain: &str, record_type: RecordType) -> Self {
        let domain = domain.strip_suffix('.').unwrap_or(domain).to_ascii_lowercase();
        Self {
            domain: Arc::from(domain),
            record_type,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.record_type.to_u16())
    }
}

/// Raw DNS responses keyed by domain and record type.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
}

impl ResponseCache {
    /// Connect `backend` and wrap it. Connection errors are returned as is.
    pub async fn open<B>(mut backend: B) -> anyhow::Result<Self>
    where
        B: CacheBackend + 'static,
    {
        backend.connect().await?;
        Ok(Self {
            backend: Arc::new(backend),
        })
    }

    /// Cached response for the key, or `None` when absent or the backend failed.
    pub async fn get(&self, domain: &str, record_type: RecordType) -> Option<Bytes> {
        let key = CacheKey::new(domain, record_type).to_string();
        match self.backend.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed");
                None
            }
        }
    }

    pub async fn set(&self, domain: &str, record_type: RecordType, response: Bytes, ttl: u64) -> anyhow::Result<()> {
        let key = CacheKey::new(domain, record_type).to_string();
        tracing::trace!(key = %key, ttl, "caching response");
        self.backend.set(&key, response, ttl).await
    }
}
