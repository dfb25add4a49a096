use warden_dns::DnsResponseCode;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The client's query could not be parsed or is not answerable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("upstream {upstream} failed: {reason}")]
    Upstream { upstream: String, reason: String },

    #[error("timed out")]
    Timeout,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResolveError {
    pub fn upstream(upstream: impl ToString, reason: impl ToString) -> Self {
        Self::Upstream {
            upstream: upstream.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Response code to answer a DNS client with.
    pub fn response_code(&self) -> DnsResponseCode {
        match self {
            ResolveError::InvalidRequest(_) => DnsResponseCode::FormatError,
            _ => DnsResponseCode::ServerFailure,
        }
    }
}
