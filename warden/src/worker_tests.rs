#[cfg(test)]
mod tests {
    use std::io::Write;

    use warden_cache::{MokaBackend, ResponseCache};
    use warden_dns::{DnsMessage, DnsResponseCode, RecordType};
    use warden_queue::{AccessEvent, EventQueue, MemoryQueue};

    use super::super::*;
    use crate::config::UrlhausConfig;

    fn offline(hosts_path: std::path::PathBuf) -> WorkerConfig {
        WorkerConfig {
            hosts_path,
            workers: 2,
            urlhaus: UrlhausConfig {
                enabled: false,
                ..UrlhausConfig::default()
            },
        }
    }

    #[test]
    fn test_blockers_follow_config() {
        let names = |config: &WorkerConfig| blockers(config).iter().map(|b| b.name()).collect::<Vec<_>>();

        assert_eq!(names(&WorkerConfig::default()), ["hosts", "urlhaus"]);
        assert_eq!(names(&offline("/hosts.block".into())), ["hosts"]);
    }

    #[tokio::test]
    async fn test_drain_blocks_listed_domains() {
        let mut hosts = tempfile::NamedTempFile::new().unwrap();
        writeln!(hosts, "# ads\n0.0.0.0 tracker.example\n127.0.0.1 ignored.example").unwrap();

        let cache = ResponseCache::open(MokaBackend::new(100)).await.unwrap();
        let queue = EventQueue::open(MemoryQueue::new()).await.unwrap();
        for domain in ["tracker.example", "ignored.example", "fine.example"] {
            queue.publish(&AccessEvent::new(domain, RecordType::A)).await.unwrap();
        }

        let worker = build_worker(&offline(hosts.path().to_path_buf()), cache.clone(), queue)
            .await
            .unwrap();
        assert_eq!(worker.drain().await.unwrap(), 3);

        for record_type in [RecordType::A, RecordType::AAAA] {
            let blocked = cache.get("tracker.example", record_type).await.unwrap();
            let message = DnsMessage::decode(&blocked).unwrap();
            assert_eq!(message.response_code().unwrap(), DnsResponseCode::NxDomain);
        }
        assert!(cache.get("ignored.example", RecordType::A).await.is_none());
        assert!(cache.get("fine.example", RecordType::A).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_hosts_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::open(MokaBackend::new(100)).await.unwrap();
        let queue = EventQueue::open(MemoryQueue::new()).await.unwrap();

        let result = build_worker(&offline(dir.path().join("absent.block")), cache, queue).await;
        assert!(result.is_err());
    }
}
