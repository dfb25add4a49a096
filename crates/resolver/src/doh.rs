use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    StatusCode,
    header::{ACCEPT, CONTENT_TYPE},
};
use warden_context::DnsRequestCtx;
use warden_dns::helpers::HEADER_LEN;

use crate::{DnsResolver, ResolveError};

pub const DNS_MESSAGE: &str = "application/dns-message";

/// Resolves by POSTing the raw query to a DoH endpoint.
pub struct DohResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl DohResolver {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build DoH client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub async fn exchange(&self, query: Bytes) -> Result<Bytes, ResolveError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, DNS_MESSAGE)
            .header(ACCEPT, DNS_MESSAGE)
            .body(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ResolveError::upstream(&self.endpoint, format!("status {status}")));
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        if body.len() < HEADER_LEN {
            return Err(ResolveError::upstream(
                &self.endpoint,
                format!("{} byte body is shorter than a DNS header", body.len()),
            ));
        }

        Ok(body)
    }

    fn transport_error(&self, e: reqwest::Error) -> ResolveError {
        if e.is_timeout() {
            ResolveError::Timeout
        } else {
            ResolveError::upstream(&self.endpoint, e)
        }
    }
}

#[async_trait]
impl<G, L> DnsResolver<G, L> for DohResolver
where
    G: Send + Sync + 'static,
    L: Send + Sync,
{
    async fn resolve(&self, ctx: &DnsRequestCtx<G, L>) -> Result<Bytes, ResolveError> {
        self.exchange(ctx.raw()).await
    }
}
