use serde::{Deserialize, Serialize};
use warden_dns::RecordType;

/// A successfully resolved cache miss, queued for blocklist evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub domain: String,
    #[serde(with = "record_type_code")]
    pub request_type: RecordType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<String>>,
}

impl AccessEvent {
    pub fn new(domain: impl Into<String>, request_type: RecordType) -> Self {
        Self {
            domain: domain.into(),
            request_type,
            addresses: None,
        }
    }

    pub fn with_addresses(mut self, addresses: Vec<String>) -> Self {
        self.addresses = (!addresses.is_empty()).then_some(addresses);
        self
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Record types travel as their numeric code.
mod record_type_code {
    use serde::{Deserialize, Deserializer, Serializer};
    use warden_dns::RecordType;

    pub fn serialize<S: Serializer>(value: &RecordType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(value.to_u16())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RecordType, D::Error> {
        Ok(RecordType::from(u16::deserialize(deserializer)?))
    }
}
