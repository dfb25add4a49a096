use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use warden_dns::{DnsMessage, DnsQuestion};

/// Transport a query arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    UDP,
    /// DNS over HTTPS
    DOH,
}

/// Everything known about one inbound query.
///
/// `G` is process wide state shared by all requests, `L` is scratch state owned
/// by this request and visible to middlewares and callbacks.
#[derive(Debug, Clone)]
pub struct DnsRequestCtx<G, L> {
    request_type: RequestType,
    raw: Bytes,
    message: OnceCell<DnsMessage>,
    deadline: Instant,
    global: Arc<G>,
    local: Arc<RwLock<L>>,
}

impl<G, L> DnsRequestCtx<G, L> {
    pub fn new(deadline: Duration, request_type: RequestType, raw: Bytes, global: Arc<G>, local: L) -> Self {
        Self {
            deadline: Instant::now() + deadline,
            request_type,
            raw,
            message: OnceCell::new(),
            global,
            local: Arc::new(RwLock::new(local)),
        }
    }

    /// When the answer is due; resolvers give up after this.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Lazily decode and return the DNS message.
    pub fn message(&self) -> anyhow::Result<&DnsMessage> {
        self.message.get_or_try_init(|| DnsMessage::decode(&self.raw))
    }

    /// The first question of the query.
    pub fn question(&self) -> anyhow::Result<&DnsQuestion> {
        self.message()?
            .questions()
            .first()
            .ok_or_else(|| anyhow!("query carries no question"))
    }

    pub fn raw(&self) -> Bytes {
        self.raw.clone()
    }

    pub fn global(&self) -> &G {
        &self.global
    }

    pub fn local(&self) -> RwLockReadGuard<'_, L> {
        self.local.read()
    }

    pub fn local_mut(&self) -> RwLockWriteGuard<'_, L> {
        self.local.write()
    }
}

#[async_trait]
pub trait DnsMiddleware<G, L>: Send + Sync {
    /// Return `Some` to answer the query and skip the remaining chain and the resolver.
    async fn on_query(&self, ctx: &DnsRequestCtx<G, L>) -> anyhow::Result<Option<Bytes>>;
}

pub type Middlewares<G, L> = Arc<Vec<Arc<dyn DnsMiddleware<G, L>>>>;

pub async fn run_middlewares<G, L>(mws: &[Arc<dyn DnsMiddleware<G, L>>], ctx: &DnsRequestCtx<G, L>) -> anyhow::Result<Option<Bytes>> {
    for m in mws.iter() {
        if let Some(resp) = m.on_query(ctx).await? {
            return Ok(Some(resp));
        }
    }
    Ok(None)
}
