#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write, path::Path, time::Duration};

    use super::super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.upstreams, vec!["1.1.1.1", "8.8.8.8", "9.9.9.9"]);
        assert_eq!(config.server.max_resolving_operations, 512);
        assert_eq!(config.server.response_ttl_secs, 1800);
        assert_eq!(config.redis.queue, "messages");
        assert_eq!(config.redis.url, None);
        assert_eq!(config.worker.workers, 16);
        assert!(config.worker.urlhaus.enabled);
        assert_eq!(config.stub.listen.port(), 53);
        assert!(!config.stub.block_dotless);

        config.validate().unwrap();
    }

    #[test]
    fn test_cache_policy() {
        let policy = ServerConfig::default().cache_policy();
        assert_eq!(policy.min_ttl, Duration::from_secs(3600));
        assert_eq!(policy.max_ttl, Duration::from_secs(21600));
        assert_eq!(policy.serve_ttl, 1800);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = decode(
            r#"
log_level = "debug"

[server]
port = 8443
upstreams = ["192.0.2.53:5353"]
static_dir = ""

[redis]
url = "redis://cache:6379"

[worker.urlhaus]
enabled = false
auth_key = "secret"

[stub]
block_dotless = true
"#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.server.ip, "0.0.0.0");
        assert_eq!(config.server.static_dir(), None);
        assert_eq!(config.server.upstream_addrs().unwrap()[0].port(), 5353);
        assert_eq!(config.redis.require_url().unwrap(), "redis://cache:6379");
        assert_eq!(config.redis.queue, "messages");
        assert!(!config.worker.urlhaus.enabled);
        assert_eq!(config.worker.urlhaus.auth_key.as_deref(), Some("secret"));
        assert_eq!(config.worker.urlhaus.timeout_secs, 5);
        assert_eq!(config.worker.workers, 16);
        assert!(config.stub.block_dotless);
        assert_eq!(config.stub.fallback_ttl_secs, 60);
    }

    #[test]
    fn test_tls_section() {
        let config = decode(
            r#"
[server.tls]
cert_path = "/etc/warden/cert.pem"
key_path = "/etc/warden/key.pem"
"#,
        )
        .unwrap();

        let tls = config.server.tls.unwrap();
        assert_eq!(tls.cert_path, "/etc/warden/cert.pem");
        assert_eq!(tls.key_path, "/etc/warden/key.pem");
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(decode("[server\nport = "), Err(ConfigError::Decode(_))));
        assert!(matches!(decode("[server]\nport = \"eighty\""), Err(ConfigError::Decode(_))));
    }

    #[test]
    fn test_load_config() {
        let missing = load_config(Path::new("/nonexistent/warden.toml")).unwrap();
        assert_eq!(missing, Config::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9000").unwrap();
        assert_eq!(load_config(file.path()).unwrap().server.port, 9000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("REDIS_URL", "redis://127.0.0.1/"),
                ("UPSTREAM_SERVERS", "192.0.2.1, 192.0.2.2:5353,,"),
                ("PORT", "8080"),
            ]))
            .unwrap();

        assert_eq!(config.redis.url.as_deref(), Some("redis://127.0.0.1/"));
        assert_eq!(config.server.upstreams, vec!["192.0.2.1", "192.0.2.2:5353"]);
        assert_eq!(config.server.port, 8080);

        let mut untouched = Config::default();
        untouched.apply_overrides(env(&[])).unwrap();
        assert_eq!(untouched, Config::default());
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = Config::default();
        let err = config.apply_overrides(env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.server.min_cache_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.min_cache_secs = 7200;
        config.server.max_cache_secs = 3600;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.upstreams = vec!["not-an-address".into()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.upstreams.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.ip = "::".into();
        config.validate().unwrap();
        assert!(config.server.bind_addr().unwrap().is_ipv6());
    }

    #[test]
    fn test_zero_stub_fallback_ttl_is_rejected() {
        let mut config = Config::default();
        config.stub.fallback_ttl_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stub.fallback_ttl_secs"));

        config.stub.fallback_ttl_secs = 1;
        config.validate().unwrap();
    }

    #[test]
    fn test_redis_url_required() {
        let mut config = Config::default();
        assert!(config.redis.require_url().is_err());

        config.redis.url = Some("  ".into());
        assert!(config.redis.require_url().is_err());
    }
}
