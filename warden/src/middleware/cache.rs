use async_trait::async_trait;
use bytes::Bytes;
use warden_context::{DnsMiddleware, DnsRequestCtx};
use warden_dns::helpers;

use crate::{global::Global, local::Local};

/// Serves responses from cache if available.
pub struct CacheMiddleware {
    /// Stamp the request's transaction ID onto the cached bytes.
    pub rewrite_id: bool,
}

#[async_trait]
impl DnsMiddleware<Global, Local> for CacheMiddleware {
    async fn on_query(&self, ctx: &DnsRequestCtx<Global, Local>) -> anyhow::Result<Option<Bytes>> {
        let question = ctx.question()?;

        let Some(cached) = ctx.global().cache.get(question.qname.as_str(), question.qtype).await else {
            return Ok(None);
        };

        tracing::debug!(domain = %question.qname, qtype = ?question.qtype, "cache hit");
        ctx.local_mut().cache_hit = true;

        if self.rewrite_id {
            return Ok(Some(helpers::with_transaction_id(&cached, ctx.message()?.id)?));
        }
        Ok(Some(cached))
    }
}
