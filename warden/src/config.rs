use std::{io, net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use warden_queue::DEFAULT_QUEUE_NAME;
use warden_resolver::{CachePolicy, forwarder::parse_upstream};
use warden_server::TlsConfig;

pub const DEFAULT_CONFIG_PATH: &str = "warden.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// IP address the DoH listener binds to.
    #[serde(default = "default_server_ip")]
    pub ip: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Upstream resolvers, `ip` or `ip:port`. Port 53 is implied.
    #[serde(default = "default_upstreams")]
    pub upstreams: Vec<String>,
    /// Served for everything outside `/dns-query`. Empty disables it.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_max_resolving_operations")]
    pub max_resolving_operations: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_static_timeout_secs")]
    pub static_timeout_secs: u64,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "default_min_cache_secs")]
    pub min_cache_secs: u64,
    #[serde(default = "default_max_cache_secs")]
    pub max_cache_secs: u64,
    /// TTL written into every answer the server hands out.
    #[serde(default = "default_response_ttl_secs")]
    pub response_ttl_secs: u32,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// Serve HTTPS instead of plain HTTP.
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
            upstreams: default_upstreams(),
            static_dir: default_static_dir(),
            max_resolving_operations: default_max_resolving_operations(),
            request_timeout_secs: default_request_timeout_secs(),
            static_timeout_secs: default_static_timeout_secs(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            min_cache_secs: default_min_cache_secs(),
            max_cache_secs: default_max_cache_secs(),
            response_ttl_secs: default_response_ttl_secs(),
            max_request_size: default_max_request_size(),
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.ip, self.port)
            .parse::<SocketAddr>()
            .or_else(|_| format!("[{}]:{}", self.ip, self.port).parse::<SocketAddr>())
            .map_err(|_| ConfigError::Invalid(format!("invalid server address {}:{}", self.ip, self.port)))
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            min_ttl: Duration::from_secs(self.min_cache_secs),
            max_ttl: Duration::from_secs(self.max_cache_secs),
            serve_ttl: self.response_ttl_secs,
        }
    }

    pub fn upstream_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.upstreams
            .iter()
            .map(|upstream| parse_upstream(upstream).map_err(|e| ConfigError::Invalid(e.to_string())))
            .collect()
    }

    pub fn static_dir(&self) -> Option<PathBuf> {
        (!self.static_dir.is_empty()).then(|| PathBuf::from(&self.static_dir))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection string shared by the cache and the queue.
    pub url: Option<String>,
    /// Name of the list carrying access events.
    pub queue: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            queue: DEFAULT_QUEUE_NAME.into(),
        }
    }
}

impl RedisConfig {
    pub fn require_url(&self) -> Result<&str, ConfigError> {
        match self.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(ConfigError::Invalid(
                "a redis url is required, set [redis] url or REDIS_URL".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UrlhausConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub auth_key: Option<String>,
}

impl Default for UrlhausConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: warden_blocklist::urlhaus::DEFAULT_ENDPOINT.into(),
            timeout_secs: warden_blocklist::urlhaus::DEFAULT_TIMEOUT.as_secs(),
            auth_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Hosts file with `0.0.0.0 <domain>` lines.
    pub hosts_path: PathBuf,
    pub workers: usize,
    pub urlhaus: UrlhausConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            hosts_path: PathBuf::from("/hosts.block"),
            workers: 16,
            urlhaus: UrlhausConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StubConfig {
    pub listen: SocketAddr,
    /// DoH endpoint queries are forwarded to.
    pub server: String,
    pub timeout_secs: u64,
    /// Cache lifetime for answers without any TTL to go by.
    pub fallback_ttl_secs: u64,
    pub cache_capacity: u64,
    /// Answer single label names with NXDOMAIN locally.
    pub block_dotless: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 53)),
            server: "http://127.0.0.1:8000/dns-query".into(),
            timeout_secs: 5,
            fallback_ttl_secs: 60,
            cache_capacity: 10_000,
            block_dotless: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub worker: WorkerConfig,
    pub stub: StubConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to decode config: {0}")]
    Decode(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Environment overrides, looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("REDIS_URL") {
            self.redis.url = Some(url);
        }

        if let Some(servers) = lookup("UPSTREAM_SERVERS") {
            self.server.upstreams = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a port number: {port:?}")))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.min_cache_secs < 1 {
            return Err(ConfigError::Invalid("server.min_cache_secs must be at least 1".into()));
        }
        if server.min_cache_secs > server.max_cache_secs {
            return Err(ConfigError::Invalid(format!(
                "server.min_cache_secs ({}) exceeds server.max_cache_secs ({})",
                server.min_cache_secs, server.max_cache_secs
            )));
        }
        if server.max_resolving_operations == 0 {
            return Err(ConfigError::Invalid("server.max_resolving_operations must be positive".into()));
        }
        if server.upstreams.is_empty() {
            return Err(ConfigError::Invalid("at least one upstream server is required".into()));
        }
        server.upstream_addrs()?;
        server.bind_addr()?;

        if self.worker.workers == 0 {
            return Err(ConfigError::Invalid("worker.workers must be positive".into()));
        }
        if self.stub.fallback_ttl_secs < 1 {
            return Err(ConfigError::Invalid("stub.fallback_ttl_secs must be at least 1".into()));
        }

        Ok(())
    }
}

/// Load the config at `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => decode(&content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Config::default()),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn decode(content: &str) -> Result<Config, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Decode(e.to_string()))
}

fn default_server_ip() -> String {
    "0.0.0.0".into()
}

fn default_server_port() -> u16 {
    8000
}

fn default_upstreams() -> Vec<String> {
    vec!["1.1.1.1".into(), "8.8.8.8".into(), "9.9.9.9".into()]
}

fn default_static_dir() -> String {
    "/static".into()
}

fn default_max_resolving_operations() -> usize {
    512
}

fn default_request_timeout_secs() -> u64 {
    3
}

fn default_static_timeout_secs() -> u64 {
    5
}

fn default_upstream_timeout_secs() -> u64 {
    3
}

fn default_min_cache_secs() -> u64 {
    3600
}

fn default_max_cache_secs() -> u64 {
    21600
}

fn default_response_ttl_secs() -> u32 {
    1800
}

fn default_max_request_size() -> usize {
    4096
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
