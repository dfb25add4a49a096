use std::collections::HashSet;

use anyhow::{bail, ensure};

use crate::domain_name::DomainName;

/// Cursor over a DNS message in wire format.
pub struct DnsMessageReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> DnsMessageReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Seek to a position inside the buffer.
    pub fn seek(&mut self, pos: usize) -> anyhow::Result<()> {
        let len = self.buffer.len();
        ensure!(pos <= len, "seek out of bounds: pos={} len={}", pos, len);
        self.position = pos;
        Ok(())
    }

    #[inline]
    fn need(&self, need: usize, what: &str) -> anyhow::Result<()> {
        let rem = self.remaining();
        ensure!(
            need <= rem,
            "buffer underflow at pos {} while reading {}: need {} bytes, have {}",
            self.position,
            what,
            need,
            rem
        );
        Ok(())
    }

    #[inline]
    fn need_at(&self, upto_exclusive: usize, what: &str) -> anyhow::Result<()> {
        ensure!(
            upto_exclusive <= self.buffer.len(),
            "buffer underflow while reading {}: need bytes up to {}, len {} (pos {})",
            what,
            upto_exclusive,
            self.buffer.len(),
            self.position
        );
        Ok(())
    }

    pub fn read_u8(&mut self) -> anyhow::Result<u8> {
        self.need(1, "u8")?;
        let byte = self.buffer[self.position];
        self.position += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> anyhow::Result<u16> {
        self.need(2, "u16")?;
        let bytes = &self.buffer[self.position..self.position + 2];
        self.position += 2;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> anyhow::Result<u32> {
        self.need(4, "u32")?;
        let data = &self.buffer[self.position..self.position + 4];
        self.position += 4;
        Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
    }

    /// Read a possibly compressed domain name.
    pub fn read_qname(&mut self) -> anyhow::Result<DomainName> {
        let mut pos = self.position;
        let mut jumped = false;
        let mut seen = HashSet::new();
        let mut labels: Vec<&[u8]> = Vec::new();

        loop {
            if pos >= self.buffer.len() {
                bail!("qname out of bounds at pos {} (buf len {})", pos, self.buffer.len())
            }

            if !seen.insert(pos) {
                bail!("qname compression pointer loop detected at pos {}", pos);
            }

            let length = self.buffer[pos];

            if length & 0xC0 == 0xC0 {
                self.need_at(pos + 2, "compression pointer")?;

                let offset = (((length as usize) & 0x3F) << 8) | (self.buffer[pos + 1] as usize);
                if offset >= self.buffer.len() {
                    bail!(
                        "compression pointer offset {} out of bounds (buf len {})",
                        offset,
                        self.buffer.len()
                    );
                }

                if !jumped {
                    self.position = pos + 2;
                }

                pos = offset;
                jumped = true;
                continue;
            }

            if length & 0xC0 != 0 {
                bail!("unsupported label type 0x{:02x} at pos {}", length, pos);
            }

            if length == 0 {
                if !jumped {
                    self.position = pos + 1;
                }
                break;
            }

            let label_len = length as usize;
            pos += 1;

            if pos + label_len > self.buffer.len() {
                bail!(
                    "label overruns buffer at pos {}: need {} bytes, have {}",
                    pos,
                    label_len,
                    self.buffer.len().saturating_sub(pos)
                );
            }

            labels.push(&self.buffer[pos..pos + label_len]);

            pos += label_len;

            if !jumped {
                self.position = pos;
            }
        }

        DomainName::from_labels(&labels)
    }

    /// Advance past a domain name without decoding it.
    ///
    /// A compression pointer ends the name; its target is only bounds checked.
    pub fn skip_qname(&mut self) -> anyhow::Result<()> {
        loop {
            let length = self.read_u8()?;
            match length & 0xC0 {
                0xC0 => {
                    let low = self.read_u8()?;
                    let offset = (((length as usize) & 0x3F) << 8) | low as usize;
                    ensure!(offset < self.buffer.len(), "compression pointer offset {} out of bounds", offset);
                    return Ok(());
                }
                0x00 if length == 0 => return Ok(()),
                0x00 => {
                    self.read_bytes(length as usize)?;
                }
                _ => bail!("unsupported label type 0x{:02x} at pos {}", length, self.position - 1),
            }
        }
    }

    pub fn read_bytes(&mut self, length: usize) -> anyhow::Result<&'a [u8]> {
        self.need(length, "raw bytes")?;
        let data = &self.buffer[self.position..self.position + length];
        self.position += length;
        Ok(data)
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of unread bytes.
    ///
    /// ```
    /// use warden_dns::reader::DnsMessageReader;
    /// let buf = [0u8, 1, 2];
    /// let mut r = DnsMessageReader::new(&buf);
    /// assert_eq!(r.remaining(), 3);
    /// r.seek(1).unwrap();
    /// assert_eq!(r.remaining(), 2);
    /// ```
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}

/// Types that can be parsed directly from a DNS message.
pub trait DnsReadable: Sized {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self>;
}
