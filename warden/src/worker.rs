use std::{sync::Arc, time::Duration};

use anyhow::Context;
use warden_blocklist::{Blocker, BlocklistEngine, HostsBlacklist, UrlhausBlocker, Worker};
use warden_cache::{RedisBackend, ResponseCache};
use warden_queue::{EventQueue, RedisQueue};

use crate::config::{Config, WorkerConfig};

/// Run the blocklist worker until the queue fails, or once over the backlog with `drain`.
pub async fn run(config: Config, drain: bool) -> anyhow::Result<()> {
    let redis_url = config.redis.require_url()?;

    let cache = ResponseCache::open(RedisBackend::open(redis_url)?)
        .await
        .context("failed to connect the response cache")?;
    let queue = EventQueue::open(RedisQueue::open(redis_url, config.redis.queue.clone())?)
        .await
        .context("failed to connect the event queue")?;

    let worker = build_worker(&config.worker, cache, queue).await?;

    if drain {
        let processed = worker.drain().await?;
        tracing::info!(processed, "queue drained");
        return Ok(());
    }
    worker.run().await
}

pub fn blockers(config: &WorkerConfig) -> Vec<Box<dyn Blocker>> {
    let mut blockers: Vec<Box<dyn Blocker>> = vec![Box::new(HostsBlacklist::from_path(&config.hosts_path))];

    let urlhaus = &config.urlhaus;
    if urlhaus.enabled {
        blockers.push(Box::new(
            UrlhausBlocker::new(urlhaus.endpoint.clone(), Duration::from_secs(urlhaus.timeout_secs))
                .with_auth_key(urlhaus.auth_key.clone()),
        ));
    }

    blockers
}

pub async fn build_worker(config: &WorkerConfig, cache: ResponseCache, queue: EventQueue) -> anyhow::Result<Worker> {
    let engine = BlocklistEngine::connect(cache, blockers(config)).await?;
    Ok(Worker::new(Arc::new(engine), queue, config.workers))
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod worker_tests;
