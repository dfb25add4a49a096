use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use anyhow::ensure;
use bytes::Bytes;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    domain_name::DomainName,
    reader::{DnsMessageReader, DnsReadable},
    u16_enum_with_unknown,
    writer::{DnsMessageWriter, DnsWritable, MAX_MESSAGE_LEN},
};

/// A decoded DNS message.
///
/// EDNS is not modelled separately: an OPT pseudo record decodes as a regular
/// additional record and is written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsMessage {
    /// Transaction id
    pub id: u16,
    pub flags: DnsFlags,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecord>,
    authority_records: Vec<DnsRecord>,
    additional_records: Vec<DnsRecord>,
}

impl DnsMessage {
    pub fn new(
        id: u16,
        flags: DnsFlags,
        questions: Vec<DnsQuestion>,
        answers: Vec<DnsRecord>,
        authority_records: Vec<DnsRecord>,
        additional_records: Vec<DnsRecord>,
    ) -> Self {
        Self {
            id,
            flags,
            questions,
            answers,
            authority_records,
            additional_records,
        }
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        let mut reader = DnsMessageReader::new(data);

        let id = reader.read_u16()?;
        let flags = DnsFlags::read_from(&mut reader)?;

        let qdcount = reader.read_u16()?;
        let ancount = reader.read_u16()?;
        let nscount = reader.read_u16()?;
        let arcount = reader.read_u16()?;

        let questions = (0..qdcount)
            .map(|_| DnsQuestion::read_from(&mut reader))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let answers = read_records(&mut reader, ancount)?;
        let authority_records = read_records(&mut reader, nscount)?;
        let additional_records = read_records(&mut reader, arcount)?;

        Ok(Self {
            id,
            flags,
            questions,
            answers,
            authority_records,
            additional_records,
        })
    }

    pub fn encode(&self) -> anyhow::Result<Bytes> {
        let mut writer = DnsMessageWriter::new_with_max(MAX_MESSAGE_LEN);

        writer.write_u16(self.id)?;
        self.flags.write_to(&mut writer)?;

        writer.write_u16(self.questions.len() as u16)?;
        writer.write_u16(self.answers.len() as u16)?;
        writer.write_u16(self.authority_records.len() as u16)?;
        writer.write_u16(self.additional_records.len() as u16)?;

        for question in &self.questions {
            question.write_to(&mut writer)?;
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authority_records)
            .chain(&self.additional_records)
        {
            record.write_to(&mut writer)?;
        }

        Ok(writer.into_bytes())
    }

    pub fn questions(&self) -> &[DnsQuestion] {
        &self.questions
    }

    pub fn answers(&self) -> &[DnsRecord] {
        &self.answers
    }

    pub fn authority_records(&self) -> &[DnsRecord] {
        &self.authority_records
    }

    pub fn additional_records(&self) -> &[DnsRecord] {
        &self.additional_records
    }

    pub fn set_response_code(&mut self, response_code: DnsResponseCode) {
        let code: u8 = response_code.into();
        self.flags.rcode_low = code & 0x0F;
    }

    pub fn response_code(&self) -> anyhow::Result<DnsResponseCode> {
        Ok(DnsResponseCode::try_from(self.flags.rcode_low)?)
    }

    /// Addresses from A and AAAA answers owned by `name`.
    pub fn addresses_for(&self, name: &str) -> Vec<IpAddr> {
        self.answers
            .iter()
            .filter(|record| record.name.as_str() == name)
            .filter_map(|record| match record.data {
                DnsRecordData::Ipv4(addr) => Some(IpAddr::V4(addr)),
                DnsRecordData::Ipv6(addr) => Some(IpAddr::V6(addr)),
                _ => None,
            })
            .collect()
    }
}

fn read_records(reader: &mut DnsMessageReader, count: u16) -> anyhow::Result<Vec<DnsRecord>> {
    (0..count).map(|_| DnsRecord::read_from(reader)).collect()
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct DnsFlags {
    /// Query or Response
    pub response: bool,
    pub opcode: DnsOpcode,
    pub authorative_answer: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    /// Reserved, must be zero.
    pub(crate) z: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    pub(crate) rcode_low: u8,
}

impl DnsFlags {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        response: bool,
        opcode: DnsOpcode,
        authorative_answer: bool,
        truncated: bool,
        recursion_desired: bool,
        recursion_available: bool,
        authentic_data: bool,
        checking_disabled: bool,
    ) -> Self {
        Self {
            response,
            opcode,
            authorative_answer,
            truncated,
            recursion_desired,
            recursion_available,
            z: false,
            authentic_data,
            checking_disabled,
            rcode_low: 0,
        }
    }
}

impl TryFrom<u16> for DnsFlags {
    type Error = anyhow::Error;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        Ok(Self {
            response: (bits >> 15) & 0x1 != 0,
            opcode: DnsOpcode::try_from(((bits >> 11) & 0xF) as u8)?,
            authorative_answer: (bits >> 10) & 0x1 != 0,
            truncated: (bits >> 9) & 0x1 != 0,
            recursion_desired: (bits >> 8) & 0x1 != 0,
            recursion_available: (bits >> 7) & 0x1 != 0,
            z: (bits >> 6) & 0x1 != 0,
            authentic_data: (bits >> 5) & 0x1 != 0,
            checking_disabled: (bits >> 4) & 0x1 != 0,
            rcode_low: (bits & 0x0F) as u8,
        })
    }
}

impl From<DnsFlags> for u16 {
    fn from(flags: DnsFlags) -> Self {
        let opcode: u8 = flags.opcode.into();
        ((flags.response as u16) << 15)
            | ((opcode as u16) << 11)
            | ((flags.authorative_answer as u16) << 10)
            | ((flags.truncated as u16) << 9)
            | ((flags.recursion_desired as u16) << 8)
            | ((flags.recursion_available as u16) << 7)
            | ((flags.z as u16) << 6)
            | ((flags.authentic_data as u16) << 5)
            | ((flags.checking_disabled as u16) << 4)
            | (flags.rcode_low & 0x0F) as u16
    }
}

impl DnsReadable for DnsFlags {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        DnsFlags::try_from(reader.read_u16()?)
    }
}

impl DnsWritable for DnsFlags {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_u16((*self).into())
    }
}

/// Response codes that fit in the header.
///
/// Based on: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-6
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DnsResponseCode {
    #[default]
    NoError = 0,
    /// The request was malformed
    FormatError = 1,
    ServerFailure = 2,
    /// Non-existent domain
    NxDomain = 3,
    NotImp = 4,
    Refused = 5,
    YXDomain = 6,
    YXRRSet = 7,
    NXRRSet = 8,
    NotAuth = 9,
    NotZone = 10,
    DSOTYPENI = 11,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DnsOpcode {
    #[default]
    Query = 0,
    /// Inverse query, obsolete
    IQuery = 1,
    Status = 2,
    Notify = 4,
    Update = 5,
    /// DNS stateful operations
    Dso = 6,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnsQuestion {
    pub qname: DomainName,
    pub qtype: RecordType,
    pub qclass: ClassType,
}

impl DnsQuestion {
    pub fn new(qname: DomainName, qtype: RecordType, qclass: ClassType) -> Self {
        Self { qname, qtype, qclass }
    }
}

impl DnsReadable for DnsQuestion {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let qname = reader.read_qname()?;
        let qtype = RecordType::from(reader.read_u16()?);
        let qclass = ClassType::from(reader.read_u16()?);

        Ok(Self { qname, qtype, qclass })
    }
}

impl DnsWritable for DnsQuestion {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_qname(&self.qname)?;
        writer.write_u16(self.qtype.to_u16())?;
        writer.write_u16(self.qclass.to_u16())?;
        Ok(())
    }
}

u16_enum_with_unknown! {
    /// DNS record types. Codes without a variant decode as `Unknown`.
    ///
    /// Based on: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml#dns-parameters-4
    pub enum RecordType {
        /// IPv4 host address
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        /// Pointer (for reverse DNS)
        PTR = 12,
        HINFO = 13,
        MX = 15,
        TXT = 16,
        /// IPv6 host address
        AAAA = 28,
        SRV = 33,
        NAPTR = 35,
        DNAME = 39,
        /// EDNS pseudo record
        OPT = 41,
        DS = 43,
        SSHFP = 44,
        RRSIG = 46,
        NSEC = 47,
        DNSKEY = 48,
        NSEC3 = 50,
        TLSA = 52,
        SVCB = 64,
        HTTPS = 65,
        ANY = 255,
        CAA = 257,
    }
}

impl RecordType {
    /// The other address family for A and AAAA, `None` for everything else.
    pub fn complementary_address_type(self) -> Option<RecordType> {
        match self {
            RecordType::A => Some(RecordType::AAAA),
            RecordType::AAAA => Some(RecordType::A),
            _ => None,
        }
    }
}

u16_enum_with_unknown! {
    /// DNS classes.
    pub enum ClassType {
        /// Internet
        IN = 1,
        /// Chaosnet
        CH = 3,
        /// Hesiod
        HS = 4,
        NONE = 254,
        ANY = 255,
    }
}

/// Decoded record data. Types without a dedicated variant keep their raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsRecordData {
    Raw(Vec<u8>),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// CNAME, NS and PTR targets
    DomainName(DomainName),
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    MX {
        priority: u16,
        host: DomainName,
    },
}

impl DnsRecordData {
    pub fn write(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        match self {
            DnsRecordData::Raw(data) => writer.write_bytes(data),
            DnsRecordData::Ipv4(addr) => writer.write_bytes(&addr.octets()),
            DnsRecordData::Ipv6(addr) => writer.write_bytes(&addr.octets()),
            DnsRecordData::DomainName(name) => writer.write_qname(name),
            DnsRecordData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                writer.write_qname(mname)?;
                writer.write_qname(rname)?;
                for value in [serial, refresh, retry, expire, minimum] {
                    writer.write_u32(*value)?;
                }
                Ok(())
            }
            DnsRecordData::MX { priority, host } => {
                writer.write_u16(*priority)?;
                writer.write_qname(host)
            }
        }
    }

    /// Decode `data_length` bytes of record data of the given type.
    pub fn read_from_record_type(
        reader: &mut DnsMessageReader,
        record_type: RecordType,
        data_length: usize,
    ) -> anyhow::Result<DnsRecordData> {
        let start = reader.position();

        let data = match record_type {
            RecordType::A => {
                ensure!(data_length == 4, "A record with rdlength {}", data_length);
                let raw = reader.read_bytes(4)?;
                DnsRecordData::Ipv4(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]))
            }
            RecordType::AAAA => {
                ensure!(data_length == 16, "AAAA record with rdlength {}", data_length);
                let mut octets = [0u8; 16];
                octets.copy_from_slice(reader.read_bytes(16)?);
                DnsRecordData::Ipv6(Ipv6Addr::from(octets))
            }
            RecordType::CNAME | RecordType::NS | RecordType::PTR => DnsRecordData::DomainName(reader.read_qname()?),
            RecordType::SOA => DnsRecordData::SOA {
                mname: reader.read_qname()?,
                rname: reader.read_qname()?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            RecordType::MX => DnsRecordData::MX {
                priority: reader.read_u16()?,
                host: reader.read_qname()?,
            },
            _ => DnsRecordData::Raw(reader.read_bytes(data_length)?.to_vec()),
        };

        let consumed = reader.position() - start;
        ensure!(
            consumed == data_length,
            "{:?} record data used {} bytes but rdlength is {}",
            record_type,
            consumed,
            data_length
        );

        Ok(data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: DomainName,
    pub record_type: RecordType,
    pub class: ClassType,
    pub ttl: u32,
    pub data: DnsRecordData,
}

impl DnsRecord {
    pub fn new(name: DomainName, ttl: u32, data: DnsRecordData, record_type: RecordType) -> Self {
        Self {
            name,
            record_type,
            class: ClassType::IN,
            ttl,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn data(&self) -> &DnsRecordData {
        &self.data
    }
}

impl DnsReadable for DnsRecord {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let name = reader.read_qname()?;
        let record_type = RecordType::from(reader.read_u16()?);
        let class = ClassType::from(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let data_length = reader.read_u16()? as usize;

        let data = DnsRecordData::read_from_record_type(reader, record_type, data_length)?;

        Ok(Self {
            name,
            record_type,
            class,
            ttl,
            data,
        })
    }
}

impl DnsWritable for DnsRecord {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_qname(&self.name)?;
        writer.write_u16(self.record_type.to_u16())?;
        writer.write_u16(self.class.to_u16())?;
        writer.write_u32(self.ttl)?;

        // Reserve rdlength and patch it once the data is written.
        let rdlen_pos = writer.position();
        writer.write_u16(0)?;

        let before = writer.position();
        self.data.write(writer)?;
        let rdlen = (writer.position() - before) as u16;

        writer.overwrite_bytes(rdlen_pos, &rdlen.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::DnsMessageBuilder;

    use super::*;

    fn name(s: &str) -> DomainName {
        DomainName::from_ascii(s).unwrap()
    }

    #[test]
    fn test_encode_decode() {
        let packet = DnsMessageBuilder::new()
            .with_id(12345)
            .with_flags(DnsFlags::new(true, DnsOpcode::Query, false, false, true, true, false, false))
            .add_question(DnsQuestion::new(name("example.com"), RecordType::A, ClassType::IN))
            .build();

        let bytes = packet.encode().unwrap();
        let decoded = DnsMessage::decode(&bytes).unwrap();

        assert_eq!(decoded.id, 12345);
        assert_eq!(decoded.questions().len(), 1);
        assert_eq!(&*decoded.questions()[0].qname, "example.com");
        assert_eq!(decoded.questions()[0].qtype, RecordType::A);
        assert_eq!(decoded.questions()[0].qclass, ClassType::IN);
        assert!(decoded.flags.response);
        assert!(decoded.flags.recursion_available);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_flags_bits() {
        let flags = DnsFlags::try_from(0x8583).unwrap();
        assert!(flags.response);
        assert!(flags.authorative_answer);
        assert!(flags.recursion_desired);
        assert!(flags.recursion_available);
        assert!(!flags.truncated);
        assert_eq!(flags.rcode_low, 3);
        assert_eq!(u16::from(flags), 0x8583);
    }

    #[test]
    fn test_records_round_trip() {
        let message = DnsMessageBuilder::new()
            .with_id(7)
            .add_question(DnsQuestion::new(name("www.example.com"), RecordType::A, ClassType::IN))
            .add_answer(DnsRecord::new(
                name("www.example.com"),
                300,
                DnsRecordData::DomainName(name("example.com")),
                RecordType::CNAME,
            ))
            .add_answer(DnsRecord::new(
                name("example.com"),
                60,
                DnsRecordData::Ipv4(Ipv4Addr::new(93, 184, 216, 34)),
                RecordType::A,
            ))
            .add_authority_record(DnsRecord::new(
                name("example.com"),
                3600,
                DnsRecordData::SOA {
                    mname: name("ns.example.com"),
                    rname: name("hostmaster.example.com"),
                    serial: 1,
                    refresh: 2,
                    retry: 3,
                    expire: 4,
                    minimum: 5,
                },
                RecordType::SOA,
            ))
            .add_additional_record(DnsRecord::new(
                name("example.com"),
                10,
                DnsRecordData::Raw(b"\x05hello".to_vec()),
                RecordType::TXT,
            ))
            .build();

        let decoded = DnsMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.answers()[1].ttl(), 60);
    }

    #[test]
    fn test_unknown_types_survive() {
        let message = DnsMessageBuilder::new()
            .add_question(DnsQuestion::new(name("example.com"), RecordType::from(65280), ClassType::from(4096)))
            .build();

        let decoded = DnsMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded.questions()[0].qtype, RecordType::Unknown(65280));
        assert_eq!(decoded.questions()[0].qclass, ClassType::Unknown(4096));
    }

    #[test]
    fn test_rdlength_mismatch_is_rejected() {
        let message = DnsMessageBuilder::new()
            .add_answer(DnsRecord::new(
                name("example.com"),
                60,
                DnsRecordData::Ipv4(Ipv4Addr::LOCALHOST),
                RecordType::A,
            ))
            .build();

        let mut bytes = message.encode().unwrap().to_vec();
        // rdlength sits right before the four address bytes.
        let rdlen_pos = bytes.len() - 6;
        bytes[rdlen_pos..rdlen_pos + 2].copy_from_slice(&5u16.to_be_bytes());
        bytes.push(0);

        assert!(DnsMessage::decode(&bytes).is_err());
    }

    fn binary_query(fill: u8) -> Vec<u8> {
        let mut bytes = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        bytes.push(40);
        bytes.extend_from_slice(&[fill; 40]);
        bytes.extend_from_slice(b"\x03com\x00");
        bytes.extend_from_slice(&[0, 1, 0, 1]);
        bytes
    }

    #[test]
    fn test_binary_labels_decode_losslessly() {
        let bytes = binary_query(0xff);
        let decoded = DnsMessage::decode(&bytes).unwrap();

        let qname = &decoded.questions()[0].qname;
        assert_eq!(qname.as_str(), format!("{}.com", "\\255".repeat(40)));
        assert_eq!(decoded.encode().unwrap().as_ref(), &bytes[..]);

        let other = DnsMessage::decode(&binary_query(0xfe)).unwrap();
        assert_ne!(other.questions()[0].qname, *qname);
    }

    #[test]
    fn test_addresses_for() {
        let message = DnsMessageBuilder::new()
            .add_answer(DnsRecord::new(
                name("example.com"),
                60,
                DnsRecordData::Ipv4(Ipv4Addr::new(10, 0, 0, 1)),
                RecordType::A,
            ))
            .add_answer(DnsRecord::new(
                name("example.com"),
                60,
                DnsRecordData::Ipv6(Ipv6Addr::LOCALHOST),
                RecordType::AAAA,
            ))
            .add_answer(DnsRecord::new(
                name("other.example.com"),
                60,
                DnsRecordData::Ipv4(Ipv4Addr::new(10, 0, 0, 2)),
                RecordType::A,
            ))
            .build();

        let addresses = message.addresses_for("example.com");
        assert_eq!(
            addresses,
            vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), IpAddr::V6(Ipv6Addr::LOCALHOST)]
        );
    }

    #[test]
    fn test_response_code() {
        let mut message = DnsMessageBuilder::new().build();
        assert_eq!(message.response_code().unwrap(), DnsResponseCode::NoError);
        message.set_response_code(DnsResponseCode::NxDomain);
        assert_eq!(message.response_code().unwrap(), DnsResponseCode::NxDomain);
    }

    #[test]
    fn test_complementary_address_type() {
        assert_eq!(RecordType::A.complementary_address_type(), Some(RecordType::AAAA));
        assert_eq!(RecordType::AAAA.complementary_address_type(), Some(RecordType::A));
        assert_eq!(RecordType::MX.complementary_address_type(), None);
    }
}
