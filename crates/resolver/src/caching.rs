use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Semaphore, oneshot};
use warden_cache::ResponseCache;
use warden_context::DnsRequestCtx;
use warden_dns::{DnsMessage, DnsQuestion, rewrite_answer_ttl, shortest_answer_ttl};
use warden_queue::{AccessEvent, EventQueue};

use crate::{DnsResolver, ResolveError, UpstreamForwarder};

/// How long resolved answers are cached and which TTL clients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Lower bound for the cache lifetime of an upstream answer.
    pub min_ttl: Duration,
    /// Upper bound for the cache lifetime, which also bounds how long a newly
    /// blocked domain may keep resolving.
    pub max_ttl: Duration,
    /// TTL written into every answer handed to clients.
    pub serve_ttl: u32,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            min_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(21600),
            serve_ttl: 1800,
        }
    }
}

impl CachePolicy {
    pub fn cache_ttl(&self, shortest_answer: Duration) -> Duration {
        shortest_answer.max(self.min_ttl).min(self.max_ttl)
    }
}

/// Resolves cache misses upstream and records them.
///
/// Upstream attempts are bounded by a semaphore that is held only for the
/// exchange itself. Each attempt runs in its own task so that an abandoned
/// request still warms the cache and emits its access event.
pub struct CachingResolver {
    inner: Arc<Inner>,
    limiter: Arc<Semaphore>,
}

struct Inner {
    forwarder: UpstreamForwarder,
    cache: ResponseCache,
    events: EventQueue,
    policy: CachePolicy,
}

impl CachingResolver {
    pub fn new(
        forwarder: UpstreamForwarder,
        cache: ResponseCache,
        events: EventQueue,
        policy: CachePolicy,
        max_inflight: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                forwarder,
                cache,
                events,
                policy,
            }),
            limiter: Arc::new(Semaphore::new(max_inflight)),
        }
    }
}

#[async_trait]
impl<G, L> DnsResolver<G, L> for CachingResolver
where
    G: Send + Sync + 'static,
    L: Send + Sync,
{
    async fn resolve(&self, ctx: &DnsRequestCtx<G, L>) -> Result<Bytes, ResolveError> {
        let question = ctx
            .question()
            .map_err(|e| ResolveError::InvalidRequest(e.to_string()))?
            .clone();

        let permit = tokio::time::timeout_at(ctx.deadline(), self.limiter.clone().acquire_owned())
            .await
            .map_err(|_| ResolveError::Timeout)?
            .map_err(|e| ResolveError::Other(e.into()))?;

        let (tx, rx) = oneshot::channel();
        let inner = self.inner.clone();
        let query = ctx.raw();

        tokio::spawn(async move {
            let result = inner.forwarder.forward(&query).await;
            drop(permit);

            match result {
                Ok(raw) => {
                    let served = match rewrite_answer_ttl(&raw, inner.policy.serve_ttl) {
                        Ok(served) => served,
                        Err(e) => {
                            tracing::debug!(domain = %question.qname, error = %e, "serving upstream answer unmodified");
                            raw.clone()
                        }
                    };

                    // The requester may be gone already.
                    let _ = tx.send(Ok(served.clone()));

                    inner.record(&question, &raw, served).await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            }
        });

        match tokio::time::timeout_at(ctx.deadline(), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ResolveError::Other(anyhow::anyhow!("resolution task ended without a result"))),
            Err(_) => Err(ResolveError::Timeout),
        }
    }
}

impl Inner {
    /// Cache the served answer and queue the access. Failures are logged only.
    async fn record(&self, question: &DnsQuestion, raw: &[u8], served: Bytes) {
        let domain = question.qname.as_str();
        let ttl = self.policy.cache_ttl(shortest_answer_ttl(raw));

        if let Err(e) = self.cache.set(domain, question.qtype, served, ttl.as_secs()).await {
            tracing::warn!(domain, error = %e, "failed to cache upstream answer");
        }

        let addresses = match DnsMessage::decode(raw) {
            Ok(message) => message.addresses_for(domain).iter().map(ToString::to_string).collect(),
            Err(_) => Vec::new(),
        };

        let event = AccessEvent::new(domain, question.qtype).with_addresses(addresses);
        if let Err(e) = self.events.publish(&event).await {
            tracing::warn!(domain, error = %e, "failed to queue access event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Mutex, atomic::Ordering},
    };

    use warden_cache::{CacheBackend, MokaBackend};
    use warden_context::RequestType;
    use warden_dns::RecordType;
    use warden_queue::MemoryQueue;

    use super::*;
    use crate::forwarder::{
        Upstreams,
        tests::{fake_upstream, query, slow_fake_upstream},
    };

    type TtlLog = Arc<Mutex<HashMap<String, u64>>>;

    /// Moka storage that also remembers the TTL of every write.
    struct TtlRecorder {
        inner: MokaBackend,
        ttls: TtlLog,
    }

    #[async_trait]
    impl CacheBackend for TtlRecorder {
        async fn connect(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Bytes, ttl: u64) -> anyhow::Result<()> {
            self.ttls.lock().unwrap().insert(key.to_string(), ttl);
            self.inner.set(key, value, ttl).await
        }
    }

    struct Harness {
        resolver: CachingResolver,
        cache: ResponseCache,
        events: EventQueue,
        ttls: TtlLog,
    }

    async fn harness(upstream: std::net::SocketAddr, max_inflight: usize) -> Harness {
        let ttls = TtlLog::default();
        let cache = ResponseCache::open(TtlRecorder {
            inner: MokaBackend::new(64),
            ttls: ttls.clone(),
        })
        .await
        .unwrap();
        let events = EventQueue::open(MemoryQueue::new()).await.unwrap();
        let forwarder = UpstreamForwarder::new(Upstreams::new(vec![upstream]).unwrap(), Duration::from_secs(1), 512);

        Harness {
            resolver: CachingResolver::new(forwarder, cache.clone(), events.clone(), CachePolicy::default(), max_inflight),
            cache,
            events,
            ttls,
        }
    }

    fn ctx(raw: Bytes, timeout: Duration) -> DnsRequestCtx<(), ()> {
        DnsRequestCtx::new(timeout, RequestType::DOH, raw, Arc::new(()), ())
    }

    async fn wait_for_cache(cache: &ResponseCache, domain: &str) -> Bytes {
        for _ in 0..100 {
            if let Some(bytes) = cache.get(domain, RecordType::A).await {
                return bytes;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{domain} never reached the cache");
    }

    async fn wait_for_event(events: &EventQueue) -> AccessEvent {
        for _ in 0..100 {
            if let Some(raw) = events.try_next().await.unwrap() {
                return AccessEvent::from_json(&raw).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no access event was queued");
    }

    #[test]
    fn test_cache_ttl_is_clamped() {
        let policy = CachePolicy::default();
        assert_eq!(policy.cache_ttl(Duration::from_secs(5)), Duration::from_secs(3600));
        assert_eq!(policy.cache_ttl(Duration::from_secs(7200)), Duration::from_secs(7200));
        assert_eq!(policy.cache_ttl(Duration::from_secs(86400)), Duration::from_secs(21600));
    }

    #[tokio::test]
    async fn test_miss_is_served_cached_and_queued() {
        let (upstream, hits) = fake_upstream(5).await;
        let h = harness(upstream, 8).await;

        let response = h
            .resolver
            .resolve(&ctx(query("fresh.example", RecordType::A, 0x0102), Duration::from_secs(2)))
            .await
            .unwrap();

        let message = DnsMessage::decode(&response).unwrap();
        assert_eq!(message.id, 0x0102);
        assert_eq!(message.answers()[0].ttl(), 1800);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let cached = wait_for_cache(&h.cache, "fresh.example").await;
        assert_eq!(cached, response);
        assert_eq!(h.ttls.lock().unwrap().get("fresh.example:1"), Some(&3600));

        let event = wait_for_event(&h.events).await;
        assert_eq!(event.domain, "fresh.example");
        assert_eq!(event.request_type, RecordType::A);
        assert_eq!(event.addresses, Some(vec!["192.0.2.1".to_string()]));
    }

    #[tokio::test]
    async fn test_limiter_exhaustion_is_timeout() {
        let (upstream, hits) = fake_upstream(60).await;
        let h = harness(upstream, 0).await;

        let err = h
            .resolver
            .resolve(&ctx(query("busy.example", RecordType::A, 1), Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Timeout));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_still_warms_cache() {
        let (upstream, _) = slow_fake_upstream(60, Duration::from_millis(150)).await;
        let h = harness(upstream, 8).await;

        let err = h
            .resolver
            .resolve(&ctx(query("slow.example", RecordType::A, 7), Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Timeout));

        let cached = wait_for_cache(&h.cache, "slow.example").await;
        let message = DnsMessage::decode(&cached).unwrap();
        assert_eq!(message.answers()[0].ttl(), 1800);
        assert_eq!(wait_for_event(&h.events).await.domain, "slow.example");
    }

    #[tokio::test]
    async fn test_query_without_question_is_rejected() {
        let (upstream, hits) = fake_upstream(60).await;
        let h = harness(upstream, 8).await;

        let empty = warden_dns::DnsMessageBuilder::new().build().encode().unwrap();
        let err = h.resolver.resolve(&ctx(empty, Duration::from_secs(1))).await.unwrap_err();

        assert!(matches!(err, ResolveError::InvalidRequest(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
