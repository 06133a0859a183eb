//! Proxy configuration types.
//!
//! Defines the configuration for the proxy server: where it listens, how it
//! talks to upstream sites, and which extra destinations it refuses.

use crate::error::{ProxyError, Result};
use ipnet::IpNet;
use pane::HostFilter;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Browser identity presented to upstream sites.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for the proxy server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Bind address (default: 127.0.0.1)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Bind port (0 = OS-assigned ephemeral port)
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Externally visible URL of the proxy endpoint, used when rewriting
    /// pages. When unset it is derived from each request's `Host` header.
    #[serde(default)]
    pub public_endpoint: Option<String>,

    /// Total time allowed for one upstream fetch, redirects included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum redirect hops followed per fetch.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Largest upstream body accepted, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Resolve hostnames before connecting and refuse those resolving to
    /// denied addresses. The connection is pinned to the checked addresses.
    #[serde(default = "default_resolve_dns")]
    pub resolve_dns: bool,

    /// Additional hostnames to deny. A leading `*.` denies every subdomain.
    #[serde(default)]
    pub deny_hosts: Vec<String>,

    /// Additional CIDR ranges to deny (on top of built-in defaults).
    #[serde(default)]
    pub deny_cidrs: Vec<IpNet>,

    /// Maximum concurrent connections (0 = unlimited).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            bind_port: default_bind_port(),
            public_endpoint: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
            user_agent: default_user_agent(),
            resolve_dns: default_resolve_dns(),
            deny_hosts: Vec::new(),
            deny_cidrs: Vec::new(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)
}

fn default_bind_port() -> u16 {
    8787
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_resolve_dns() -> bool {
    true
}

fn default_max_connections() -> usize {
    256
}

impl ProxyConfig {
    /// Upstream fetch timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Host filter with the built-in deny list plus the configured extras.
    #[must_use]
    pub fn host_filter(&self) -> HostFilter {
        HostFilter::with_extra(&self.deny_hosts, &self.deny_cidrs)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(ProxyError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ProxyError::Config(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(endpoint) = &self.public_endpoint {
            let parsed = url::Url::parse(endpoint).map_err(|e| {
                ProxyError::Config(format!("public_endpoint '{endpoint}' is not a URL: {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ProxyError::Config(format!(
                    "public_endpoint '{endpoint}' must be an http(s) URL"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.bind_addr, IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
        assert_eq!(config.bind_port, 8787);
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
        assert!(config.resolve_dns);
        assert!(config.public_endpoint.is_none());
        assert_eq!(config.max_connections, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: ProxyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn test_config_deserialization() {
        let json = r#"{
            "bind_port": 9000,
            "public_endpoint": "https://proxy.example.com/web-proxy",
            "request_timeout_secs": 5,
            "resolve_dns": false,
            "deny_hosts": ["*.corp.example"],
            "deny_cidrs": ["100.64.0.0/10"]
        }"#;
        let config: ProxyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.bind_port, 9000);
        assert_eq!(
            config.public_endpoint.as_deref(),
            Some("https://proxy.example.com/web-proxy")
        );
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(!config.resolve_dns);
        assert_eq!(config.max_redirects, 10);

        let filter = config.host_filter();
        assert!(!filter.check_name("git.corp.example").is_allowed());
        assert!(!filter.check_name("100.64.1.1").is_allowed());
        assert!(filter.check_name("example.com").is_allowed());
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = ProxyConfig {
            public_endpoint: Some("http://127.0.0.1:8787/".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ProxyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let zero_timeout = ProxyConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());

        let bad_endpoint = ProxyConfig {
            public_endpoint: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(bad_endpoint.validate().is_err());

        let ftp_endpoint = ProxyConfig {
            public_endpoint: Some("ftp://proxy.example.com/".to_string()),
            ..Default::default()
        };
        assert!(ftp_endpoint.validate().is_err());
    }
}
