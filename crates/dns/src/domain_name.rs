use std::fmt::{Display, Formatter, Write};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::{bail, ensure};

const ROOT: &str = ".";

/// A validated, lowercase domain name without the trailing root dot.
///
/// The root itself is represented as `"."`. Label bytes outside printable ASCII,
/// as well as `.` and `\` inside a label, are kept as `\DDD` decimal escapes so
/// that every wire name maps to exactly one string.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct DomainName(Arc<str>);

impl DomainName {
    /// The root domain.
    pub fn root() -> Self {
        Self(Arc::from(ROOT))
    }

    /// Create a domain name from its presentation form, validated according to RFC 1035.
    pub fn from_ascii(s: impl AsRef<str>) -> anyhow::Result<Self> {
        let input = s.as_ref().trim();

        if input == ROOT || input.is_empty() {
            return Ok(Self::root());
        }

        let mut labels = parse_presentation(input)?;
        if labels.len() > 1 && labels.last().is_some_and(|label| label.is_empty()) {
            labels.pop();
        }

        Self::from_labels(&labels).map_err(|err| anyhow::anyhow!("{}: {}", err, input))
    }

    /// Create a domain name from raw wire labels. An empty list is the root.
    pub fn from_labels<L: AsRef<[u8]>>(labels: &[L]) -> anyhow::Result<Self> {
        if labels.is_empty() {
            return Ok(Self::root());
        }

        let mut total = 1; // root label
        let mut name = String::new();
        for label in labels {
            let label = label.as_ref();
            ensure!(!label.is_empty(), "empty domain label");
            ensure!(label.len() <= 63, "domain label too long ({} bytes)", label.len());
            total += 1 + label.len();

            if !name.is_empty() {
                name.push('.');
            }
            for byte in label.iter().map(u8::to_ascii_lowercase) {
                if is_plain(byte) {
                    name.push(byte as char);
                } else {
                    let _ = write!(name, "\\{byte:03}");
                }
            }
        }
        ensure!(total <= 255, "domain name too long ({} bytes)", total);

        Ok(Self(Arc::from(name)))
    }

    /// The raw wire labels of this name, leftmost first. Empty for the root.
    pub fn labels(&self) -> Vec<Vec<u8>> {
        if self.is_root() {
            return Vec::new();
        }
        // Names are only built from validated labels.
        parse_presentation(&self.0).unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == ROOT
    }

    /// True for the root and for single-label names such as `localhost` or `wpad`.
    pub fn is_single_label(&self) -> bool {
        self.is_root() || !self.0.contains('.')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for DomainName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for DomainName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_plain(byte: u8) -> bool {
    byte.is_ascii_graphic() && byte != b'.' && byte != b'\\'
}

/// Split a presentation-form name into raw labels, decoding `\DDD` and `\X` escapes.
pub(crate) fn parse_presentation(name: &str) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut labels = Vec::new();
    let mut label = Vec::new();
    let mut bytes = name.bytes();

    while let Some(byte) = bytes.next() {
        match byte {
            b'.' => labels.push(std::mem::take(&mut label)),
            b'\\' => {
                let Some(first) = bytes.next() else {
                    bail!("dangling escape in: {}", name);
                };
                if first.is_ascii_digit() {
                    let mut value = u32::from(first - b'0');
                    for _ in 0..2 {
                        match bytes.next() {
                            Some(digit) if digit.is_ascii_digit() => value = value * 10 + u32::from(digit - b'0'),
                            _ => bail!("incomplete \\DDD escape in: {}", name),
                        }
                    }
                    ensure!(value <= 255, "escape \\{} out of range in: {}", value, name);
                    label.push(value as u8);
                } else {
                    label.push(first);
                }
            }
            other => label.push(other),
        }
    }
    labels.push(label);

    Ok(labels)
}
