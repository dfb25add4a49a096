use bytes::Bytes;

use async_trait::async_trait;
use warden_context::DnsRequestCtx;

pub mod caching;
pub mod doh;
pub mod error;
pub mod forwarder;

pub use caching::{CachePolicy, CachingResolver};
pub use doh::DohResolver;
pub use error::ResolveError;
pub use forwarder::UpstreamForwarder;

#[async_trait]
pub trait DnsResolver<G, L>: Send + Sync {
    async fn resolve(&self, ctx: &DnsRequestCtx<G, L>) -> Result<Bytes, ResolveError>;
}

pub type DynResolver<G, L> = dyn DnsResolver<G, L>;
