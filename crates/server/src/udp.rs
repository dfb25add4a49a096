use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use warden_context::{DnsRequestCtx, RequestType};
use warden_dns::DnsMessageBuilder;

use crate::{ServerState, process_query};

/// Run the DNS server over UDP.
pub async fn run_udp<G, L>(bind_addr: SocketAddr, state: Arc<ServerState<G, L>>, recv_size: usize) -> anyhow::Result<()>
where
    G: Send + Sync + 'static,
    L: Default + Send + Sync + 'static,
{
    let socket = UdpSocket::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind UDP listener on {bind_addr}"))?;

    tracing::info!("UDP listening on {}", bind_addr);

    serve_udp(socket, state, recv_size).await
}

/// Receive loop over an already bound socket.
pub async fn serve_udp<G, L>(socket: UdpSocket, state: Arc<ServerState<G, L>>, recv_size: usize) -> anyhow::Result<()>
where
    G: Send + Sync + 'static,
    L: Default + Send + Sync + 'static,
{
    let socket = Arc::new(socket);
    let mut buffer = BytesMut::with_capacity(recv_size);

    loop {
        buffer.resize(recv_size, 0);
        let (len, client) = socket.recv_from(&mut buffer[..]).await?;
        let raw = buffer.split_to(len).freeze();

        let socket = socket.clone();
        let state = state.clone();

        tokio::spawn(async move {
            let ctx = DnsRequestCtx::new(state.timeout, RequestType::UDP, raw, state.global.clone(), L::default());

            // malformed datagrams get no reply
            let reply = match ctx.message() {
                Ok(message) => DnsMessageBuilder::reply_to(message),
                Err(e) => {
                    tracing::debug!(client = %client, error = %e, "dropping malformed datagram");
                    return;
                }
            };

            let response = match process_query(&state, ctx).await {
                Ok(answer) => answer,
                Err(e) => match reply.with_response(e.response_code()).build().encode() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        tracing::warn!(client = %client, error = %err, "failed to build error response");
                        return;
                    }
                },
            };

            if let Err(e) = socket.send_to(&response, client).await {
                tracing::warn!(client = %client, error = %e, "failed to write response");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use warden_dns::{DnsMessage, DnsResponseCode};
    use warden_resolver::{DynResolver, ResolveError};

    use super::*;
    use crate::tests::{FixedResolver, query};

    async fn listener(resolver: Arc<DynResolver<(), ()>>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let state = Arc::new(ServerState::new(resolver, Arc::new(()), Duration::from_secs(1)));
        tokio::spawn(serve_udp(socket, state, 512));
        addr
    }

    async fn exchange(server: SocketAddr, payload: &[u8]) -> Option<Vec<u8>> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(payload, server).await.unwrap();

        let mut buf = [0u8; 512];
        match tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_answers_query() {
        let server = listener(Arc::new(FixedResolver::answering(b"answer"))).await;

        let reply = exchange(server, &query("example.com", 3)).await.unwrap();
        assert_eq!(reply, b"answer");
    }

    #[tokio::test]
    async fn test_failure_replies_servfail_with_request_id() {
        let server = listener(Arc::new(FixedResolver::failing(|| ResolveError::Timeout))).await;

        let reply = exchange(server, &query("example.com", 0xBEEF)).await.unwrap();
        let message = DnsMessage::decode(&reply).unwrap();

        assert_eq!(message.id, 0xBEEF);
        assert!(message.flags.response);
        assert_eq!(message.response_code().unwrap(), DnsResponseCode::ServerFailure);
        assert_eq!(message.questions()[0].qname.as_str(), "example.com");
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_dropped() {
        let server = listener(Arc::new(FixedResolver::answering(b"answer"))).await;

        assert!(exchange(server, b"\x01\x02junk").await.is_none());
        assert!(exchange(server, &query("example.com", 4)).await.is_some());
    }
}
