use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use warden_queue::AccessEvent;

use crate::Blocker;

/// Probed by Firefox to decide whether to turn on its own DoH client.
pub const CANARY_DOMAIN: &str = "use-application-dns.net";

const BLOCKED_PREFIX: &str = "0.0.0.0 ";

/// Domain set loaded once from a hosts file, immutable afterwards.
#[derive(Debug, Clone)]
pub struct HostsBlacklist {
    source: Option<PathBuf>,
    domains: HashSet<String>,
}

impl HostsBlacklist {
    /// The file is read on `connect`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            source: Some(path.as_ref().to_path_buf()),
            domains: canary_only(),
        }
    }

    pub fn parse(contents: &str) -> Self {
        let mut domains = canary_only();
        domains.extend(parse_hosts(contents));
        Self { source: None, domains }
    }

    pub fn contains(&self, domain: &str) -> bool {
        let domain = domain.trim_end_matches('.');
        self.domains.contains(domain) || self.domains.contains(&domain.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[async_trait]
impl Blocker for HostsBlacklist {
    fn name(&self) -> &'static str {
        "hosts"
    }

    async fn connect(&mut self) -> anyhow::Result<()> {
        if let Some(path) = self.source.take() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read hosts file {}", path.display()))?;
            self.domains.extend(parse_hosts(&contents));
            tracing::info!(path = %path.display(), domains = self.domains.len(), "loaded hosts blacklist");
        }
        Ok(())
    }

    fn is_async(&self) -> bool {
        false
    }

    async fn is_bad(&self, event: &AccessEvent) -> anyhow::Result<bool> {
        Ok(self.contains(&event.domain))
    }
}

fn canary_only() -> HashSet<String> {
    HashSet::from([CANARY_DOMAIN.to_string()])
}

/// Domains from `0.0.0.0 <domain>` lines; everything else is ignored.
fn parse_hosts(contents: &str) -> impl Iterator<Item = String> + '_ {
    contents.lines().filter_map(|line| {
        let rest = line.strip_prefix(BLOCKED_PREFIX)?;
        let rest = rest.split('#').next().unwrap_or("");
        let domain = rest.split_whitespace().next()?.trim_end_matches('.').to_ascii_lowercase();

        // some lists map the address onto itself
        if domain.is_empty() || domain == "0.0.0.0" {
            return None;
        }
        Some(domain)
    })
}
