use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, ensure};
use rand::Rng;

const DNS_PORT: u16 = 53;

/// Parse `ip`, `ip:port`, `[v6]:port` or a bare IPv6 address. Port 53 is implied.
pub fn parse_upstream(value: &str) -> anyhow::Result<SocketAddr> {
    let value = value.trim();
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let ip = value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .with_context(|| format!("invalid upstream address {value:?}"))?;
    Ok(SocketAddr::new(ip, DNS_PORT))
}

/// Configured upstream servers; one is picked at random per resolution.
#[derive(Debug, Clone)]
pub struct Upstreams {
    list: Vec<SocketAddr>,
}

impl Upstreams {
    pub fn new(list: Vec<SocketAddr>) -> anyhow::Result<Self> {
        ensure!(!list.is_empty(), "at least one upstream server is required");
        Ok(Self { list })
    }

    pub fn pick(&self) -> SocketAddr {
        if self.list.len() == 1 {
            return self.list[0];
        }
        self.list[rand::rng().random_range(0..self.list.len())]
    }

    pub fn as_slice(&self) -> &[SocketAddr] {
        &self.list
    }
}
