pub mod builder;
pub mod domain_name;
pub mod helpers;
pub mod macros;
pub mod message;
pub mod nxdomain;
pub mod reader;
pub mod ttl;
pub mod writer;

pub use builder::DnsMessageBuilder;
pub use domain_name::DomainName;
pub use message::{
    ClassType, DnsFlags, DnsMessage, DnsOpcode, DnsQuestion, DnsRecord, DnsRecordData, DnsResponseCode, RecordType,
};
pub use nxdomain::build_nxdomain_response;
pub use ttl::{rewrite_answer_ttl, shortest_answer_ttl};

pub use reader::DnsMessageReader;
pub use writer::DnsMessageWriter;
