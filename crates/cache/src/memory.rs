use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use moka::{
    Expiry,
    future::{Cache, CacheBuilder},
};

use crate::CacheBackend;

#[derive(Clone)]
struct Entry {
    value: Bytes,
    /// `None` never expires.
    ttl: Option<Duration>,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _: &String, entry: &Entry, _: Instant) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(&self, _: &String, entry: &Entry, _: Instant, _: Option<Duration>) -> Option<Duration> {
        entry.ttl
    }
}

/// In-process backend with per-entry expiry, bounded by entry count.
pub struct MokaBackend {
    cache: Cache<String, Entry>,
}

impl MokaBackend {
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: CacheBuilder::new(max_entries).expire_after(EntryExpiry).build(),
        }
    }
}

#[async_trait]
impl CacheBackend for MokaBackend {
    async fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: u64) -> anyhow::Result<()> {
        let ttl = (ttl > 0).then(|| Duration::from_secs(ttl));
        self.cache.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }
}
