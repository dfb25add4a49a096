use async_trait::async_trait;
use bytes::Bytes;
use warden_context::{DnsMiddleware, DnsRequestCtx};
use warden_dns::{build_nxdomain_response, helpers};

use crate::{global::Global, local::Local};

/// Answers names without an embedded dot with NXDOMAIN.
///
/// Browsers probe random single label names to detect hijacking resolvers;
/// those never deserve a cache slot or an upstream round trip.
pub struct DotlessMiddleware;

#[async_trait]
impl DnsMiddleware<Global, Local> for DotlessMiddleware {
    async fn on_query(&self, ctx: &DnsRequestCtx<Global, Local>) -> anyhow::Result<Option<Bytes>> {
        let question = ctx.question()?;
        if !(question.qname.is_root() || question.qname.is_single_label()) {
            return Ok(None);
        }

        tracing::debug!(domain = %question.qname, "answering dotless name locally");

        let response = build_nxdomain_response(question.qname.as_str(), question.qtype)?;
        let response = helpers::with_transaction_id(&response, ctx.message()?.id)?;

        ctx.local_mut().synthesized = true;
        Ok(Some(response))
    }
}
