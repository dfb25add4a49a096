//! TTL inspection and rewriting directly on the wire image.
//!
//! Both functions walk the message without decoding record data so that every
//! byte outside the answer TTL fields is preserved exactly, including name
//! compression and EDNS options.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::reader::DnsMessageReader;

struct SectionCounts {
    questions: u16,
    answers: u16,
    authority: u16,
    additional: u16,
}

impl SectionCounts {
    fn read(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        reader.seek(4)?;
        Ok(Self {
            questions: reader.read_u16()?,
            answers: reader.read_u16()?,
            authority: reader.read_u16()?,
            additional: reader.read_u16()?,
        })
    }
}

fn skip_question(reader: &mut DnsMessageReader) -> anyhow::Result<()> {
    reader.skip_qname()?;
    reader.read_bytes(4)?; // type, class
    Ok(())
}

/// Skip one resource record. Returns the offset of its TTL field and the TTL.
fn skip_record(reader: &mut DnsMessageReader) -> anyhow::Result<(usize, u32)> {
    reader.skip_qname()?;
    reader.read_bytes(4)?; // type, class
    let ttl_pos = reader.position();
    let ttl = reader.read_u32()?;
    let rdlength = reader.read_u16()? as usize;
    reader.read_bytes(rdlength)?;
    Ok((ttl_pos, ttl))
}

/// Shortest TTL across the answer section.
///
/// Zero when there are no answers or the message is malformed before the first one.
/// A malformed answer ends the scan with whatever was seen so far.
pub fn shortest_answer_ttl(response: &[u8]) -> Duration {
    let mut reader = DnsMessageReader::new(response);

    let Ok(counts) = SectionCounts::read(&mut reader) else {
        return Duration::ZERO;
    };

    for _ in 0..counts.questions {
        if skip_question(&mut reader).is_err() {
            return Duration::ZERO;
        }
    }

    let mut shortest: Option<u32> = None;
    for _ in 0..counts.answers {
        match skip_record(&mut reader) {
            Ok((_, ttl)) => shortest = Some(shortest.map_or(ttl, |s| s.min(ttl))),
            Err(_) => break,
        }
    }

    Duration::from_secs(shortest.unwrap_or(0) as u64)
}

/// Copy of `response` with every answer TTL set to `ttl`.
///
/// Fails if the message cannot be walked to the end of its additional section.
pub fn rewrite_answer_ttl(response: &[u8], ttl: u32) -> anyhow::Result<Bytes> {
    let mut reader = DnsMessageReader::new(response);
    let counts = SectionCounts::read(&mut reader)?;

    for _ in 0..counts.questions {
        skip_question(&mut reader)?;
    }

    let mut ttl_offsets = Vec::with_capacity(counts.answers as usize);
    for _ in 0..counts.answers {
        let (pos, _) = skip_record(&mut reader)?;
        ttl_offsets.push(pos);
    }

    for _ in 0..(counts.authority as u32 + counts.additional as u32) {
        skip_record(&mut reader)?;
    }

    let mut out = BytesMut::from(response);
    for pos in ttl_offsets {
        out[pos..pos + 4].copy_from_slice(&ttl.to_be_bytes());
    }

    Ok(out.freeze())
}
