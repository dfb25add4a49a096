#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::{Method, Request, StatusCode, header::CONTENT_TYPE};
    use warden_blocklist::{BlocklistEngine, HostsBlacklist, Worker};
    use warden_cache::{MokaBackend, ResponseCache};
    use warden_dns::{DnsMessage, DnsRecordData, DnsResponseCode, RecordType};
    use warden_queue::{AccessEvent, EventQueue, MemoryQueue};
    use warden_server::{DNS_MESSAGE, DohService};

    use super::super::{build_state, doh_config};
    use crate::{
        config::Config,
        global::Global,
        local::Local,
        test_support::{UPSTREAM_V4, UPSTREAM_V6, eventually, fake_upstream, query},
    };

    struct Harness {
        service: DohService<Global, Local>,
        cache: ResponseCache,
        events: EventQueue,
        upstream_queries: Arc<AtomicUsize>,
    }

    async fn harness(upstream: SocketAddr, upstream_queries: Arc<AtomicUsize>) -> Harness {
        let mut config = Config::default();
        config.server.upstreams = vec![upstream.to_string()];
        config.server.static_dir = String::new();

        let cache = ResponseCache::open(MokaBackend::new(1_000)).await.unwrap();
        let events = EventQueue::open(MemoryQueue::new()).await.unwrap();

        let state = build_state(&config, cache.clone(), events.clone()).unwrap();
        let service = DohService::new(&doh_config(&config).unwrap(), state);

        Harness {
            service,
            cache,
            events,
            upstream_queries,
        }
    }

    impl Harness {
        async fn ask(&self, body: Bytes) -> (StatusCode, Bytes) {
            let req = Request::builder()
                .method(Method::POST)
                .uri("/dns-query")
                .header(CONTENT_TYPE, DNS_MESSAGE)
                .body(Full::new(body))
                .unwrap();

            let response = self.service.handle(req).await;
            let status = response.status();
            (status, response.into_body().collect().await.unwrap().to_bytes())
        }

        fn upstream_queries(&self) -> usize {
            self.upstream_queries.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_dotless_name_gets_nxdomain_without_upstream() {
        let (upstream, count) = fake_upstream(5).await;
        let h = harness(upstream, count).await;

        let (status, body) = h.ask(query("localhost", RecordType::A, 0x4242)).await;
        assert_eq!(status, StatusCode::OK);

        let message = DnsMessage::decode(&body).unwrap();
        assert_eq!(message.id, 0x4242);
        assert_eq!(message.response_code().unwrap(), DnsResponseCode::NxDomain);
        assert!(message.flags.authorative_answer);

        assert_eq!(h.upstream_queries(), 0);
        assert!(h.cache.get("localhost", RecordType::A).await.is_none());
        assert!(h.events.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_miss_is_reserved_with_fixed_ttl_then_cached() {
        let (upstream, count) = fake_upstream(5).await;
        let h = harness(upstream, count).await;

        let (status, first) = h.ask(query("www.example.com", RecordType::A, 7)).await;
        assert_eq!(status, StatusCode::OK);

        let message = DnsMessage::decode(&first).unwrap();
        assert_eq!(message.id, 7);
        assert_eq!(message.answers().len(), 1);
        assert_eq!(message.answers()[0].ttl(), 1800);
        assert_eq!(message.answers()[0].data(), &DnsRecordData::Ipv4(UPSTREAM_V4));

        let cache = &h.cache;
        assert!(
            eventually(|| async move { cache.get("www.example.com", RecordType::A).await.is_some() }).await,
            "answer never reached the cache"
        );

        let (_, second) = h.ask(query("www.example.com", RecordType::A, 7)).await;
        assert_eq!(second, first);
        assert_eq!(h.upstream_queries(), 1);

        let raw = tokio::time::timeout(Duration::from_secs(2), h.events.next())
            .await
            .unwrap()
            .unwrap();
        let event = AccessEvent::from_json(&raw).unwrap();
        assert_eq!(event.domain, "www.example.com");
        assert_eq!(event.request_type, RecordType::A);
        assert_eq!(event.addresses, Some(vec![UPSTREAM_V4.to_string()]));

        // cache hits are not access events
        assert!(h.events.try_next().await.unwrap().is_none());

        let (_, v6) = h.ask(query("www.example.com", RecordType::AAAA, 8)).await;
        let message = DnsMessage::decode(&v6).unwrap();
        assert_eq!(message.answers()[0].data(), &DnsRecordData::Ipv6(UPSTREAM_V6));
        assert_eq!(h.upstream_queries(), 2);
    }

    #[tokio::test]
    async fn test_malformed_query_is_bad_request() {
        let (upstream, count) = fake_upstream(5).await;
        let h = harness(upstream, count).await;

        let (status, _) = h.ask(Bytes::from_static(b"\x00\x01\x02")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(h.upstream_queries(), 0);
    }

    #[tokio::test]
    async fn test_blacklisted_domain_stays_blocked_for_both_types() {
        let (upstream, count) = fake_upstream(5).await;
        let h = harness(upstream, count).await;

        let (_, first) = h.ask(query("ads.example.com", RecordType::A, 1)).await;
        assert_eq!(
            DnsMessage::decode(&first).unwrap().response_code().unwrap(),
            DnsResponseCode::NoError
        );

        let engine = BlocklistEngine::connect(
            h.cache.clone(),
            vec![Box::new(HostsBlacklist::parse("0.0.0.0 ads.example.com\n"))],
        )
        .await
        .unwrap();
        let worker = Worker::new(Arc::new(engine), h.events.clone(), 1);

        // the access event is queued after the answer goes out
        let mut drained = 0;
        for _ in 0..200 {
            drained += worker.drain().await.unwrap();
            if drained > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(drained, 1);

        for (record_type, id) in [(RecordType::A, 2), (RecordType::AAAA, 3)] {
            let (status, body) = h.ask(query("ads.example.com", record_type, id)).await;
            assert_eq!(status, StatusCode::OK);

            let message = DnsMessage::decode(&body).unwrap();
            assert_eq!(message.response_code().unwrap(), DnsResponseCode::NxDomain);
            assert_eq!(message.questions()[0].qtype, record_type);
        }

        assert_eq!(h.upstream_queries(), 1);
    }
}
