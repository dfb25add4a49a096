use std::{collections::HashMap, time::Duration};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use serde::Deserialize;
use warden_queue::AccessEvent;

use crate::Blocker;

pub const DEFAULT_ENDPOINT: &str = "https://urlhaus-api.abuse.ch/v1/host";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const NOT_LISTED: &str = "not listed";

#[derive(Debug, Deserialize)]
struct HostResponse {
    query_status: String,
    #[serde(default)]
    blacklists: HashMap<String, String>,
}

/// Asks the URLhaus host API whether a domain is listed.
pub struct UrlhausBlocker {
    endpoint: String,
    timeout: Duration,
    auth_key: Option<String>,
    client: Option<reqwest::Client>,
}

impl UrlhausBlocker {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            auth_key: None,
            client: None,
        }
    }

    /// Sent as the `Auth-Key` header.
    pub fn with_auth_key(mut self, key: Option<String>) -> Self {
        self.auth_key = key;
        self
    }
}

impl Default for UrlhausBlocker {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl Blocker for UrlhausBlocker {
    fn name(&self) -> &'static str {
        "urlhaus"
    }

    async fn connect(&mut self) -> anyhow::Result<()> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build URLhaus client")?;
        self.client = Some(client);
        Ok(())
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn is_bad(&self, event: &AccessEvent) -> anyhow::Result<bool> {
        let client = self.client.as_ref().ok_or_else(|| anyhow!("URLhaus client not connected"))?;

        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("host", &event.domain)
            .finish();

        let mut request = client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form);
        if let Some(key) = &self.auth_key {
            request = request.header("Auth-Key", key);
        }

        let response = request.send().await.context("URLhaus request failed")?;
        if response.status() != StatusCode::OK {
            tracing::debug!(domain = %event.domain, status = %response.status(), "URLhaus lookup not answered");
            return Ok(false);
        }

        let body = response.bytes().await.context("failed to read URLhaus response")?;
        let listed = is_listed(&body)?;
        if listed {
            tracing::info!(domain = %event.domain, "domain is listed by URLhaus");
        }
        Ok(listed)
    }
}

/// `query_status` must be "ok" and at least one blacklist must list the host.
fn is_listed(body: &[u8]) -> anyhow::Result<bool> {
    let response: HostResponse = serde_json::from_slice(body).context("malformed URLhaus response")?;

    if response.query_status != "ok" {
        return Ok(false);
    }
    Ok(response.blacklists.values().any(|status| status != NOT_LISTED))
}
