use std::{
    future::Future,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use tokio::net::UdpSocket;
use warden_dns::{
    ClassType, DnsMessage, DnsMessageBuilder, DnsQuestion, DnsRecord, DnsRecordData, DnsResponseCode, DomainName,
    RecordType,
};

pub const UPSTREAM_V4: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 10);
pub const UPSTREAM_V6: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0x10);

pub fn query(domain: &str, record_type: RecordType, id: u16) -> Bytes {
    DnsMessageBuilder::new()
        .with_id(id)
        .add_question(DnsQuestion::new(
            DomainName::from_ascii(domain).unwrap(),
            record_type,
            ClassType::IN,
        ))
        .build()
        .encode()
        .unwrap()
}

/// UDP resolver answering A and AAAA with fixed addresses and `ttl`, counting queries.
pub async fn fake_upstream(ttl: u32) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let count = Arc::new(AtomicUsize::new(0));

    let seen = count.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else { return };
            seen.fetch_add(1, Ordering::SeqCst);

            let message = DnsMessage::decode(&buf[..len]).unwrap();
            let question = message.questions()[0].clone();
            let mut builder = DnsMessageBuilder::reply_to(&message);

            let data = match question.qtype {
                RecordType::A => Some(DnsRecordData::Ipv4(UPSTREAM_V4)),
                RecordType::AAAA => Some(DnsRecordData::Ipv6(UPSTREAM_V6)),
                _ => None,
            };
            if let Some(data) = data {
                builder = builder.add_answer(DnsRecord::new(question.qname, ttl, data, question.qtype));
            }

            let response = builder.with_response(DnsResponseCode::NoError).build().encode().unwrap();
            let _ = socket.send_to(&response, peer).await;
        }
    });

    (addr, count)
}

/// Poll `check` for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
