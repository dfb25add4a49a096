use anyhow::Context;
use bytes::Bytes;

use crate::{
    builder::DnsMessageBuilder,
    domain_name::DomainName,
    message::{ClassType, DnsFlags, DnsQuestion, DnsResponseCode, RecordType},
};

/// Synthesize an authoritative NXDOMAIN answer for `domain` with a single IN question.
///
/// The transaction ID is zero; callers that answer a specific query stamp their own.
pub fn build_nxdomain_response(domain: &str, record_type: RecordType) -> anyhow::Result<Bytes> {
    let qname =
        DomainName::from_ascii(domain).with_context(|| format!("cannot encode {domain:?} as a domain name"))?;

    DnsMessageBuilder::new()
        .with_flags(DnsFlags::default())
        .authoritative()
        .add_question(DnsQuestion::new(qname, record_type, ClassType::IN))
        .with_response(DnsResponseCode::NxDomain)
        .build()
        .encode()
}
