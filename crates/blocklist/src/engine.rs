use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use warden_cache::ResponseCache;
use warden_dns::{RecordType, build_nxdomain_response};
use warden_queue::AccessEvent;

use crate::Blocker;

/// Cache TTL for block entries: never expire.
pub const BLOCKED_TTL: u64 = 0;

/// Judges access events and writes block entries into the shared cache.
pub struct BlocklistEngine {
    cache: ResponseCache,
    sync_blockers: Vec<Arc<dyn Blocker>>,
    async_blockers: Vec<Arc<dyn Blocker>>,
}

impl BlocklistEngine {
    /// Connect every blocker, keeping the given order for the sync ones.
    pub async fn connect(cache: ResponseCache, blockers: Vec<Box<dyn Blocker>>) -> anyhow::Result<Self> {
        let mut sync_blockers = Vec::new();
        let mut async_blockers = Vec::new();

        for mut blocker in blockers {
            blocker
                .connect()
                .await
                .with_context(|| format!("failed to connect blocker {}", blocker.name()))?;

            let blocker: Arc<dyn Blocker> = Arc::from(blocker);
            if blocker.is_async() {
                async_blockers.push(blocker);
            } else {
                sync_blockers.push(blocker);
            }
        }

        tracing::info!(
            sync_blockers = sync_blockers.len(),
            async_blockers = async_blockers.len(),
            "blockers connected"
        );

        Ok(Self {
            cache,
            sync_blockers,
            async_blockers,
        })
    }

    /// Evaluate `event` and block its domain on a positive verdict.
    ///
    /// Returns whether the domain was blocked.
    pub async fn process(&self, event: &AccessEvent) -> bool {
        match self.verdict(event).await {
            Some(blocker) => {
                tracing::info!(domain = %event.domain, blocker, "blocking domain");
                self.block(event).await;
                true
            }
            None => {
                tracing::trace!(domain = %event.domain, "domain is fine");
                false
            }
        }
    }

    /// Name of the blocker that judged the event bad, if any.
    pub async fn verdict(&self, event: &AccessEvent) -> Option<&'static str> {
        for blocker in &self.sync_blockers {
            match blocker.is_bad(event).await {
                Ok(true) => return Some(blocker.name()),
                Ok(false) => {}
                Err(e) => tracing::warn!(blocker = blocker.name(), domain = %event.domain, error = %e, "blocker failed"),
            }
        }

        if self.async_blockers.is_empty() {
            return None;
        }

        let mut verdicts = JoinSet::new();
        for blocker in &self.async_blockers {
            let blocker = blocker.clone();
            let event = event.clone();
            verdicts.spawn(async move { (blocker.name(), blocker.is_bad(&event).await) });
        }

        // dropping the set aborts whatever is still running
        while let Some(joined) = verdicts.join_next().await {
            match joined {
                Ok((name, Ok(true))) => return Some(name),
                Ok((_, Ok(false))) => {}
                Ok((name, Err(e))) => {
                    tracing::warn!(blocker = name, domain = %event.domain, error = %e, "blocker failed")
                }
                Err(e) => tracing::warn!(domain = %event.domain, error = %e, "blocker task died"),
            }
        }

        None
    }

    /// Overwrite the cache with NXDOMAIN for the event's type and its address twin.
    pub async fn block(&self, event: &AccessEvent) {
        self.block_type(&event.domain, event.request_type).await;

        if let Some(other) = event.request_type.complementary_address_type() {
            self.block_type(&event.domain, other).await;
        }
    }

    async fn block_type(&self, domain: &str, record_type: RecordType) {
        let response = match build_nxdomain_response(domain, record_type) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(domain, ?record_type, error = %e, "failed to build block response");
                return;
            }
        };

        if let Err(e) = self.cache.set(domain, record_type, response, BLOCKED_TTL).await {
            tracing::warn!(domain, ?record_type, error = %e, "failed to write block entry");
        }
    }
}
