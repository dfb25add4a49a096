use std::{sync::Arc, time::Duration};

use anyhow::Context;
use futures::FutureExt;
use warden_cache::{RedisBackend, ResponseCache};
use warden_context::{DnsMiddleware, DnsRequestCtx};
use warden_dns::{helpers, writer::MAX_MESSAGE_LEN};
use warden_queue::{EventQueue, RedisQueue};
use warden_resolver::{CachingResolver, UpstreamForwarder, forwarder::Upstreams};
use warden_server::{DohConfig, ErrorCallback, ServerState, error_handler, run_doh};

use crate::{
    config::Config,
    global::Global,
    local::Local,
    middleware::{CacheMiddleware, DotlessMiddleware},
};

/// Run the caching DoH edge server against the shared cache and queue.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let redis_url = config.redis.require_url()?;

    let cache = ResponseCache::open(RedisBackend::open(redis_url)?)
        .await
        .context("failed to connect the response cache")?;
    let events = EventQueue::open(RedisQueue::open(redis_url, config.redis.queue.clone())?)
        .await
        .context("failed to connect the event queue")?;

    let state = build_state(&config, cache, events)?;
    run_doh(doh_config(&config)?, state).await
}

pub fn build_state(
    config: &Config,
    cache: ResponseCache,
    events: EventQueue,
) -> anyhow::Result<Arc<ServerState<Global, Local>>> {
    let server = &config.server;

    let upstreams = Upstreams::new(server.upstream_addrs()?)?;
    let forwarder = UpstreamForwarder::new(
        upstreams,
        Duration::from_secs(server.upstream_timeout_secs),
        MAX_MESSAGE_LEN,
    );
    let resolver = CachingResolver::new(
        forwarder,
        cache.clone(),
        events,
        server.cache_policy(),
        server.max_resolving_operations,
    );

    let middlewares: Vec<Arc<dyn DnsMiddleware<Global, Local>>> = vec![
        Arc::new(DotlessMiddleware),
        Arc::new(CacheMiddleware { rewrite_id: false }),
    ];

    let state = ServerState::new(
        Arc::new(resolver),
        Arc::new(Global::new(cache)),
        Duration::from_secs(server.request_timeout_secs),
    )
    .with_middlewares(Arc::new(middlewares))
    .with_error_handler(log_failure());

    Ok(Arc::new(state))
}

pub fn doh_config(config: &Config) -> anyhow::Result<DohConfig> {
    let server = &config.server;
    Ok(DohConfig {
        bind_addr: server.bind_addr()?,
        static_dir: server.static_dir(),
        request_timeout: Duration::from_secs(server.request_timeout_secs),
        static_timeout: Duration::from_secs(server.static_timeout_secs),
        max_request_size: server.max_request_size,
        tls: server.tls.clone(),
    })
}

pub fn log_failure() -> ErrorCallback<Global, Local> {
    error_handler(|ctx: &DnsRequestCtx<Global, Local>, err| {
        async move {
            let id = helpers::extract_transaction_id(&ctx.raw()).unwrap_or_default();
            let elapsed = ctx.local().time_elapsed();
            tracing::error!(id, transport = ?ctx.request_type(), elapsed_ms = elapsed.as_millis() as u64, error = %err, "failed to answer query");
            Ok(())
        }
        .boxed()
    })
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod server_tests;
