use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::{net::UdpSocket, time::Instant};
use warden_dns::helpers::{self, HEADER_LEN};

use crate::ResolveError;

/// A fresh UDP socket connected to one upstream server.
#[derive(Debug)]
pub(crate) struct UdpConn {
    socket: UdpSocket,
    upstream: SocketAddr,
}

impl UdpConn {
    /// Bind an ephemeral port of the upstream's address family and connect it.
    pub async fn new(upstream: SocketAddr) -> Result<Self, ResolveError> {
        let bind_addr = if upstream.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ResolveError::upstream(upstream, e))?;
        socket
            .connect(upstream)
            .await
            .map_err(|e| ResolveError::upstream(upstream, e))?;
        Ok(Self { socket, upstream })
    }

    /// Send `query` and wait for the response carrying the same transaction ID.
    ///
    /// Datagrams that are not responses to this query are dropped.
    pub async fn send_and_receive(&self, query: &[u8], deadline: Instant, max_size: usize) -> Result<Bytes, ResolveError> {
        let want_id = helpers::extract_transaction_id(query)
            .ok_or_else(|| ResolveError::InvalidRequest("query shorter than its transaction id".into()))?;

        tokio::time::timeout_at(deadline, self.socket.send(query))
            .await
            .map_err(|_| ResolveError::Timeout)?
            .map_err(|e| ResolveError::upstream(self.upstream, e))?;

        let mut buf = BytesMut::zeroed(max_size);

        loop {
            let n = tokio::time::timeout_at(deadline, self.socket.recv(&mut buf))
                .await
                .map_err(|_| ResolveError::Timeout)?
                .map_err(|e| ResolveError::upstream(self.upstream, e))?;

            if n >= HEADER_LEN {
                let got_id = helpers::extract_transaction_id(&buf[..n]).unwrap_or_default();
                let qr = (buf[2] & 0x80) != 0;
                if qr && got_id == want_id {
                    buf.truncate(n);
                    return Ok(buf.freeze());
                }
            }

            tracing::trace!(upstream = %self.upstream, len = n, "ignoring unrelated datagram");
        }
    }
}
