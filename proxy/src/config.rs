use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_ALLOWED_HOST: &str = "zaparkuj.pl";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PROXY_BIND_ADDR '{value}': {reason}")]
    BindAddr { value: String, reason: String },
    #[error("invalid PROXY_UPSTREAM_TIMEOUT_SECS '{0}'")]
    Timeout(String),
    #[error("PROXY_ALLOWED_HOST must not be empty")]
    EmptyHost,
}

/// Runtime settings of the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub bind_addr: SocketAddr,
    /// Requests may target this host or any of its subdomains
    pub allowed_host: String,
    pub upstream_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            allowed_host: DEFAULT_ALLOWED_HOST.to_string(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

impl ProxyConfig {
    /// Read `PROXY_BIND_ADDR`, `PROXY_ALLOWED_HOST` and `PROXY_UPSTREAM_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_value = lookup("PROXY_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_value.parse().map_err(|e: std::net::AddrParseError| ConfigError::BindAddr {
            value: bind_value.clone(),
            reason: e.to_string(),
        })?;

        let allowed_host = lookup("PROXY_ALLOWED_HOST")
            .map(|host| host.trim().trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_ALLOWED_HOST.to_string());
        if allowed_host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let upstream_timeout = match lookup("PROXY_UPSTREAM_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| ConfigError::Timeout(raw.clone()))?,
            None => Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        };

        Ok(Self {
            bind_addr,
            allowed_host,
            upstream_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = ProxyConfig::from_lookup(lookup(&[
            ("PROXY_BIND_ADDR", "0.0.0.0:9000"),
            ("PROXY_ALLOWED_HOST", " Example.ORG "),
            ("PROXY_UPSTREAM_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 9000)));
        assert_eq!(config.allowed_host, "example.org");
        assert_eq!(config.upstream_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ProxyConfig::from_lookup(lookup(&[("PROXY_BIND_ADDR", "nowhere")])),
            Err(ConfigError::BindAddr { .. })
        ));
        assert!(matches!(
            ProxyConfig::from_lookup(lookup(&[("PROXY_UPSTREAM_TIMEOUT_SECS", "0")])),
            Err(ConfigError::Timeout(_))
        ));
        assert!(matches!(
            ProxyConfig::from_lookup(lookup(&[("PROXY_ALLOWED_HOST", "  ")])),
            Err(ConfigError::EmptyHost)
        ));
    }
}
