use anyhow::ensure;
use bytes::{Bytes, BytesMut};

/// Size of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// Extracts the transaction ID from a DNS message.
pub fn extract_transaction_id(data: &[u8]) -> Option<u16> {
    if data.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([data[0], data[1]]))
}

/// Returns a copy of `data` with its transaction ID replaced by `id`.
pub fn with_transaction_id(data: &[u8], id: u16) -> anyhow::Result<Bytes> {
    ensure!(
        data.len() >= HEADER_LEN,
        "message too short to carry a header: {} bytes",
        data.len()
    );
    let mut buf = BytesMut::from(data);
    buf[0..2].copy_from_slice(&id.to_be_bytes());
    Ok(buf.freeze())
}

/// Whether the TC bit is set in the header.
pub fn is_truncated(data: &[u8]) -> bool {
    data.get(2).is_some_and(|b| b & 0x02 != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_transaction_id() {
        assert_eq!(extract_transaction_id(&[0xAB, 0xCD, 0x01]), Some(0xABCD));
        assert_eq!(extract_transaction_id(&[0xAB]), None);
    }

    #[test]
    fn test_with_transaction_id() {
        let original = [0x00, 0x00, 0x81, 0x80, 0, 1, 0, 0, 0, 0, 0, 0, 0xFF];
        let rewritten = with_transaction_id(&original, 0x1234).unwrap();

        assert_eq!(&rewritten[0..2], &[0x12, 0x34]);
        assert_eq!(&rewritten[2..], &original[2..]);

        assert!(with_transaction_id(&[0x00, 0x01], 7).is_err());
    }

    #[test]
    fn test_is_truncated() {
        assert!(is_truncated(&[0, 0, 0x83, 0x80]));
        assert!(!is_truncated(&[0, 0, 0x81, 0x80]));
        assert!(!is_truncated(&[0, 0]));
    }
}
