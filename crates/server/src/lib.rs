use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::future::BoxFuture;
use warden_context::{DnsRequestCtx, Middlewares};
use warden_resolver::{DynResolver, ResolveError};

mod doh;
mod tls;
mod udp;

pub use doh::{DNS_MESSAGE, DNS_QUERY_PATH, DohConfig, DohService, ResponseBody, run_doh, serve_doh};
pub use tls::{TlsConfig, load_tls_acceptor};
pub use udp::{run_udp, serve_udp};

pub type SuccessCallback<G, L> =
    Arc<dyn for<'a> Fn(&'a DnsRequestCtx<G, L>, &'a Bytes) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;

pub type ErrorCallback<G, L> =
    Arc<dyn for<'a> Fn(&'a DnsRequestCtx<G, L>, &'a ResolveError) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;

/// Box a closure as a [`SuccessCallback`].
pub fn success_handler<G, L, F>(handler: F) -> SuccessCallback<G, L>
where
    F: for<'a> Fn(&'a DnsRequestCtx<G, L>, &'a Bytes) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
{
    Arc::new(handler)
}

pub fn error_handler<G, L, F>(handler: F) -> ErrorCallback<G, L>
where
    F: for<'a> Fn(&'a DnsRequestCtx<G, L>, &'a ResolveError) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Everything a listener needs to answer a query.
pub struct ServerState<G, L> {
    pub resolver: Arc<DynResolver<G, L>>,
    pub middlewares: Middlewares<G, L>,
    pub on_success: Option<SuccessCallback<G, L>>,
    pub on_error: Option<ErrorCallback<G, L>>,
    pub global: Arc<G>,
    /// Deadline handed to each request context.
    pub timeout: Duration,
}

impl<G, L> ServerState<G, L> {
    pub fn new(resolver: Arc<DynResolver<G, L>>, global: Arc<G>, timeout: Duration) -> Self {
        Self {
            resolver,
            middlewares: Arc::new(Vec::new()),
            on_success: None,
            on_error: None,
            global,
            timeout,
        }
    }

    pub fn with_middlewares(mut self, middlewares: Middlewares<G, L>) -> Self {
        self.middlewares = middlewares;
        self
    }

    pub fn with_success_handler(mut self, handler: SuccessCallback<G, L>) -> Self {
        self.on_success = Some(handler);
        self
    }

    pub fn with_error_handler(mut self, handler: ErrorCallback<G, L>) -> Self {
        self.on_error = Some(handler);
        self
    }
}

/// Answer one query: middlewares first, then the resolver.
///
/// The success handler runs detached after the answer is returned; the error
/// handler runs before the error is handed back to the listener.
pub async fn process_query<G, L>(state: &ServerState<G, L>, ctx: DnsRequestCtx<G, L>) -> Result<Bytes, ResolveError>
where
    G: Send + Sync + 'static,
    L: Send + Sync + 'static,
{
    if let Err(e) = ctx.message() {
        return Err(ResolveError::InvalidRequest(e.to_string()));
    }

    let answered = match warden_context::run_middlewares(&state.middlewares, &ctx).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!(error = %e, "middleware failed, falling through to the resolver");
            None
        }
    };

    let result = match answered {
        Some(bytes) => Ok(bytes),
        None => state.resolver.resolve(&ctx).await,
    };

    match result {
        Ok(bytes) => {
            if let Some(on_success) = state.on_success.clone() {
                let response = bytes.clone();
                tokio::spawn(async move {
                    if let Err(e) = on_success(&ctx, &response).await {
                        tracing::warn!(error = %e, "success handler failed");
                    }
                });
            }
            Ok(bytes)
        }
        Err(err) => {
            if let Some(on_error) = &state.on_error {
                if let Err(e) = on_error(&ctx, &err).await {
                    tracing::warn!(error = %e, "error handler failed");
                }
            }
            Err(err)
        }
    }
}
