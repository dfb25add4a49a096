use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use warden_cache::{MokaBackend, ResponseCache};
use warden_context::{DnsMiddleware, DnsRequestCtx};
use warden_dns::shortest_answer_ttl;
use warden_resolver::DohResolver;
use warden_server::{ServerState, SuccessCallback, run_udp, success_handler};

use crate::{
    config::StubConfig,
    global::Global,
    local::Local,
    middleware::{CacheMiddleware, DotlessMiddleware},
    server::log_failure,
};

/// Largest datagram the stub accepts.
const RECV_SIZE: usize = 4096;

/// Run the UDP stub in front of a DoH server.
pub async fn run(config: StubConfig) -> anyhow::Result<()> {
    let cache = ResponseCache::open(MokaBackend::new(config.cache_capacity)).await?;
    let state = build_state(&config, cache)?;

    tracing::info!(server = %config.server, "forwarding to DoH server");
    run_udp(config.listen, state, RECV_SIZE).await
}

pub fn build_state(config: &StubConfig, cache: ResponseCache) -> anyhow::Result<Arc<ServerState<Global, Local>>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let resolver = DohResolver::new(config.server.clone(), timeout)?;

    let mut middlewares: Vec<Arc<dyn DnsMiddleware<Global, Local>>> = Vec::new();
    if config.block_dotless {
        middlewares.push(Arc::new(DotlessMiddleware));
    }
    middlewares.push(Arc::new(CacheMiddleware { rewrite_id: true }));

    let state = ServerState::new(Arc::new(resolver), Arc::new(Global::new(cache)), timeout)
        .with_middlewares(Arc::new(middlewares))
        .with_success_handler(cache_answer(config.fallback_ttl_secs))
        .with_error_handler(log_failure());

    Ok(Arc::new(state))
}

/// Cache resolved answers for their shortest TTL, or `fallback_ttl` seconds when that is zero.
fn cache_answer(fallback_ttl: u64) -> SuccessCallback<Global, Local> {
    success_handler(move |ctx: &DnsRequestCtx<Global, Local>, response| {
        async move {
            let answered_locally = ctx.local().answered_locally();
            if answered_locally {
                return Ok(());
            }

            let question = ctx.question()?;
            let ttl = match shortest_answer_ttl(response).as_secs() {
                0 => fallback_ttl,
                ttl => ttl,
            };

            ctx.global()
                .cache
                .set(question.qname.as_str(), question.qtype, response.clone(), ttl)
                .await
        }
        .boxed()
    })
}

#[cfg(test)]
#[path = "stub_tests.rs"]
mod stub_tests;
