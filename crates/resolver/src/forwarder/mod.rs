use std::time::Duration;

use bytes::{Bytes, BytesMut};
use rand::Rng;
use tokio::time::Instant;
use warden_dns::{DnsMessage, helpers};

use crate::ResolveError;

mod udp;
mod upstream;

pub use upstream::{Upstreams, parse_upstream};

use udp::UdpConn;

/// Forwards raw queries to a random upstream over plain UDP.
pub struct UpstreamForwarder {
    upstreams: Upstreams,
    timeout: Duration,
    max_response_size: usize,
}

impl UpstreamForwarder {
    pub fn new(upstreams: Upstreams, timeout: Duration, max_response_size: usize) -> Self {
        if upstreams.as_slice().len() > 1 {
            tracing::debug!(count = upstreams.as_slice().len(), "forwarding to random upstreams");
        }
        Self {
            upstreams,
            timeout,
            max_response_size,
        }
    }

    /// Resolve `query` upstream within this forwarder's own timeout.
    ///
    /// The upstream sees a random transaction ID; the response carries the
    /// query's original one.
    pub async fn forward(&self, query: &[u8]) -> Result<Bytes, ResolveError> {
        let original = DnsMessage::decode(query).map_err(|e| ResolveError::InvalidRequest(e.to_string()))?;

        let upstream = self.upstreams.pick();
        let deadline = Instant::now() + self.timeout;
        let (randomized, _) = generate_tid(query);

        tracing::trace!(upstream = %upstream, "forwarding query");

        let conn = UdpConn::new(upstream).await?;
        let response = conn
            .send_and_receive(&randomized, deadline, self.max_response_size)
            .await
            .inspect_err(|e| tracing::debug!(upstream = %upstream, error = %e, "upstream exchange failed"))?;

        if helpers::is_truncated(&response) {
            tracing::debug!(upstream = %upstream, "upstream answer is truncated");
        }

        let response_message =
            DnsMessage::decode(&response).map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;

        if response_message.questions() != original.questions() {
            return Err(ResolveError::InvalidResponse(
                "upstream response question does not match request question".to_string(),
            ));
        }

        helpers::with_transaction_id(&response, original.id).map_err(|e| ResolveError::InvalidResponse(e.to_string()))
    }
}

/// Copy of `query` with a random transaction ID, to make spoofed answers harder to land.
fn generate_tid(query: &[u8]) -> (Bytes, u16) {
    let randomized_id = rand::rng().random::<u16>();

    let mut bytes = BytesMut::from(query);
    bytes[0..2].copy_from_slice(&randomized_id.to_be_bytes());

    (bytes.freeze(), randomized_id)
}
