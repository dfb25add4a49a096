use std::{error::Error as StdError, io, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, anyhow, bail};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited, combinators::UnsyncBoxBody};
use hyper::{
    Method, Request, Response, StatusCode,
    body::{Body, Incoming},
    header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION},
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use warden_context::{DnsRequestCtx, RequestType};
use warden_resolver::ResolveError;

use crate::{ServerState, TlsConfig, load_tls_acceptor, process_query};

pub const DNS_QUERY_PATH: &str = "/dns-query";
pub const DNS_MESSAGE: &str = "application/dns-message";

pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

#[derive(Clone, Debug)]
pub struct DohConfig {
    pub bind_addr: SocketAddr,
    /// Directory served for everything outside `/dns-query`.
    pub static_dir: Option<PathBuf>,
    pub request_timeout: Duration,
    pub static_timeout: Duration,
    pub max_request_size: usize,
    pub tls: Option<TlsConfig>,
}

/// HTTP front of the query pipeline.
pub struct DohService<G, L> {
    state: Arc<ServerState<G, L>>,
    static_files: Option<ServeDir>,
    request_timeout: Duration,
    static_timeout: Duration,
    max_request_size: usize,
}

impl<G, L> DohService<G, L>
where
    G: Send + Sync + 'static,
    L: Default + Send + Sync + 'static,
{
    pub fn new(config: &DohConfig, state: Arc<ServerState<G, L>>) -> Self {
        Self {
            state,
            static_files: config.static_dir.as_ref().map(ServeDir::new),
            request_timeout: config.request_timeout,
            static_timeout: config.static_timeout,
            max_request_size: config.max_request_size,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        if req.uri().path() == DNS_QUERY_PATH {
            match tokio::time::timeout(self.request_timeout, self.dns_query(req)).await {
                Ok(response) => response,
                Err(_) => timeout_response(),
            }
        } else {
            match tokio::time::timeout(self.static_timeout, self.static_file(req)).await {
                Ok(response) => response,
                Err(_) => timeout_response(),
            }
        }
    }

    async fn dns_query<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = req.method().clone();
        let extracted = match method {
            Method::GET => query_from_get(req.uri().query()),
            Method::POST => query_from_post(req, self.max_request_size).await,
            _ => return text(StatusCode::METHOD_NOT_ALLOWED, "Bad method"),
        };

        let query = match extracted {
            Ok(Some(query)) => query,
            Ok(None) => return redirect_home(),
            Err(e) => {
                tracing::debug!(method = %method, error = %e, "rejecting DoH request");
                return text(StatusCode::BAD_REQUEST, "Bad request");
            }
        };

        let ctx = DnsRequestCtx::new(
            self.state.timeout,
            RequestType::DOH,
            query,
            self.state.global.clone(),
            L::default(),
        );

        match process_query(&self.state, ctx).await {
            Ok(answer) => dns_message(answer),
            Err(e) => error_response(&e),
        }
    }

    async fn static_file<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
    {
        let Some(files) = &self.static_files else {
            return text(StatusCode::NOT_FOUND, "Not found");
        };

        match files.clone().oneshot(req).await {
            Ok(response) => response.map(|body| body.boxed_unsync()),
            Err(never) => match never {},
        }
    }
}

/// Listen on the configured address, with TLS when configured.
pub async fn run_doh<G, L>(config: DohConfig, state: Arc<ServerState<G, L>>) -> anyhow::Result<()>
where
    G: Send + Sync + 'static,
    L: Default + Send + Sync + 'static,
{
    let tls = config.tls.as_ref().map(load_tls_acceptor).transpose()?;
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind DoH listener on {}", config.bind_addr))?;

    tracing::info!(tls = tls.is_some(), "DoH listening on {}", config.bind_addr);

    let service = Arc::new(DohService::new(&config, state));
    serve_doh(listener, service, tls).await
}

/// Accept loop. HTTP/1.1 and HTTP/2 are detected per connection.
pub async fn serve_doh<G, L>(
    listener: TcpListener,
    service: Arc<DohService<G, L>>,
    tls: Option<TlsAcceptor>,
) -> anyhow::Result<()>
where
    G: Send + Sync + 'static,
    L: Default + Send + Sync + 'static,
{
    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service.clone();
        let tls = tls.clone();

        tokio::spawn(async move {
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve_connection(stream, service).await,
                    Err(e) => tracing::debug!(peer = %peer, error = %e, "TLS handshake failed"),
                },
                None => serve_connection(stream, service).await,
            }
        });
    }
}

async fn serve_connection<I, G, L>(io: I, service: Arc<DohService<G, L>>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    G: Send + Sync + 'static,
    L: Default + Send + Sync + 'static,
{
    let svc = service_fn(move |req: Request<Incoming>| {
        let service = service.clone();
        async move { Ok::<_, std::convert::Infallible>(service.handle(req).await) }
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), svc)
        .await
    {
        tracing::debug!(error = %e, "http connection error");
    }
}

/// `Ok(None)` means there is no query at all and the client is sent home.
fn query_from_get(query: Option<&str>) -> anyhow::Result<Option<Bytes>> {
    let param = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "dns")
            .map(|(_, value)| value.into_owned())
    });

    let Some(value) = param else {
        return Ok(None);
    };

    if value.is_empty() {
        bail!("empty dns parameter");
    }

    let decoded = URL_SAFE_NO_PAD
        .decode(value.as_bytes())
        .context("dns parameter is not unpadded base64url")?;
    Ok(Some(Bytes::from(decoded)))
}

async fn query_from_post<B>(req: Request<B>, max_size: usize) -> anyhow::Result<Option<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let essence = content_type.split(';').next().unwrap_or("").trim();
    if !essence.eq_ignore_ascii_case(DNS_MESSAGE) {
        bail!("invalid content type {content_type:?}, expected {DNS_MESSAGE}");
    }

    if let Some(len) = req.headers().get(CONTENT_LENGTH) {
        let len = len
            .to_str()
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or_else(|| anyhow!("invalid Content-Length header"))?;
        if len > max_size {
            bail!("request body too large: {len}, max: {max_size}");
        }
    }

    let body = Limited::new(req.into_body(), max_size)
        .collect()
        .await
        .map_err(|e| anyhow!("failed to read request body: {e}"))?
        .to_bytes();

    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some(body))
}

fn full(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into()).map_err(|never| match never {}).boxed_unsync()
}

fn respond(builder: hyper::http::response::Builder, body: ResponseBody) -> Response<ResponseBody> {
    builder.body(body).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to build response");
        let mut response = Response::new(full(Bytes::new()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

fn text(status: StatusCode, message: &'static str) -> Response<ResponseBody> {
    respond(
        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8"),
        full(message),
    )
}

fn timeout_response() -> Response<ResponseBody> {
    text(StatusCode::SERVICE_UNAVAILABLE, "Timeout")
}

fn redirect_home() -> Response<ResponseBody> {
    respond(
        Response::builder()
            .status(StatusCode::MOVED_PERMANENTLY)
            .header(LOCATION, "/"),
        full(Bytes::new()),
    )
}

fn dns_message(answer: Bytes) -> Response<ResponseBody> {
    respond(
        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, DNS_MESSAGE),
        full(answer),
    )
}

fn error_response(e: &ResolveError) -> Response<ResponseBody> {
    match e {
        ResolveError::InvalidRequest(_) => text(StatusCode::BAD_REQUEST, "Bad request"),
        ResolveError::Timeout => timeout_response(),
        _ => {
            tracing::error!(error = %e, "failed to resolve DoH query");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
