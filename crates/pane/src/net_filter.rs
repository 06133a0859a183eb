//! Host filtering for proxied fetches.
//!
//! The proxy fetches arbitrary URLs on behalf of a sandboxed client, so every
//! target host is checked against a deny list before any connection is made.
//!
//! # Security Properties
//!
//! - **Default deny list is hardcoded and non-overridable**: loopback,
//!   RFC1918 private networks, link-local (cloud metadata), `0.0.0.0/8` and
//!   the IPv6 loopback, link-local and unique-local ranges are always denied.
//!   Configuration can only add entries.
//! - **Literal hosts are checked as parsed**: the URL parser normalizes
//!   IPv4 shorthand (`0x7f.1`, `2130706433`) before the check, and
//!   IPv4-mapped IPv6 addresses are checked as their IPv4 form.
//! - **Resolved addresses**: callers that resolve DNS pass the resolved IPs
//!   to [`HostFilter::check_resolved`], which closes the gap where a public
//!   hostname points at an internal address.

use ipnet::IpNet;
use serde::Serialize;
use std::net::IpAddr;
use url::Host;

/// Result of a host filter check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FilterResult {
    /// Host may be fetched
    Allow,
    /// Host is, or resolved to, an address inside a denied range
    DenyCidr {
        /// The address that matched a deny range
        ip: IpAddr,
        /// The range that matched
        cidr: IpNet,
    },
    /// Host name is on the deny list
    DenyHost {
        /// The hostname that was denied
        host: String,
    },
}

impl FilterResult {
    /// Whether the result is an allow decision
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, FilterResult::Allow)
    }

    /// A human-readable reason for the decision
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            FilterResult::Allow => "allowed by host filter".to_string(),
            FilterResult::DenyCidr { ip, cidr } => {
                format!("address {} is inside denied range {}", ip, cidr)
            }
            FilterResult::DenyHost { host } => {
                format!("host {} is in the deny list", host)
            }
        }
    }
}

/// Hostnames that are always denied.
const DENY_HOSTS: &[&str] = &[
    "localhost",
    "metadata.google.internal",
    "metadata.azure.internal",
];

/// Hostname suffixes that are always denied (`*.localhost`).
const DENY_SUFFIXES: &[&str] = &[".localhost"];

/// Ranges that are always denied.
const DEFAULT_DENY_CIDRS: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
];

fn default_deny_cidrs() -> Vec<IpNet> {
    // Well-known literals; a parse failure here would be a programming error.
    DEFAULT_DENY_CIDRS
        .iter()
        .filter_map(|s| s.parse::<IpNet>().ok())
        .collect()
}

/// Deny-list filter for proxy targets.
///
/// Everything not denied is allowed: the proxy is meant to reach arbitrary
/// public sites, and only internal infrastructure is off limits.
#[derive(Debug, Clone)]
pub struct HostFilter {
    deny_cidrs: Vec<IpNet>,
    deny_hosts: Vec<String>,
    deny_suffixes: Vec<String>,
}

impl Default for HostFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl HostFilter {
    /// Filter with only the built-in deny list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            deny_cidrs: default_deny_cidrs(),
            deny_hosts: DENY_HOSTS.iter().map(|s| (*s).to_string()).collect(),
            deny_suffixes: DENY_SUFFIXES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Filter with the built-in deny list plus operator-supplied entries.
    ///
    /// Host entries starting with `*.` deny every subdomain of the rest.
    #[must_use]
    pub fn with_extra(deny_hosts: &[String], deny_cidrs: &[IpNet]) -> Self {
        let mut filter = Self::new();
        for host in deny_hosts {
            let lower = normalize_name(host);
            if let Some(suffix) = lower.strip_prefix('*') {
                filter.deny_suffixes.push(suffix.to_string());
            } else {
                filter.deny_hosts.push(lower);
            }
        }
        filter.deny_cidrs.extend(deny_cidrs.iter().copied());
        filter
    }

    /// Check a parsed URL host.
    #[must_use]
    pub fn check_host(&self, host: &Host<&str>) -> FilterResult {
        match host {
            Host::Domain(name) => self.check_name(name),
            Host::Ipv4(ip) => self.check_ip(IpAddr::V4(*ip)),
            Host::Ipv6(ip) => self.check_ip(IpAddr::V6(*ip)),
        }
    }

    /// Check a hostname string. IP literals (bracketed or not) are checked
    /// against the deny ranges, names against the deny list.
    #[must_use]
    pub fn check_name(&self, host: &str) -> FilterResult {
        let lower = normalize_name(host);
        let unbracketed = lower.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return self.check_ip(ip);
        }

        if self.deny_hosts.iter().any(|h| *h == lower)
            || self
                .deny_suffixes
                .iter()
                .any(|s| lower.ends_with(s.as_str()) && lower.len() > s.len())
        {
            return FilterResult::DenyHost {
                host: host.to_string(),
            };
        }

        FilterResult::Allow
    }

    /// Check a single address against the deny ranges.
    #[must_use]
    pub fn check_ip(&self, ip: IpAddr) -> FilterResult {
        let ip = canonical_ip(ip);
        match self.deny_cidrs.iter().find(|cidr| cidr.contains(&ip)) {
            Some(cidr) => FilterResult::DenyCidr { ip, cidr: *cidr },
            None => FilterResult::Allow,
        }
    }

    /// Check a hostname together with the addresses it resolved to.
    ///
    /// The name is checked first, then every resolved address; a single
    /// denied address denies the host.
    #[must_use]
    pub fn check_resolved(&self, host: &str, resolved_ips: &[IpAddr]) -> FilterResult {
        let by_name = self.check_name(host);
        if !by_name.is_allowed() {
            return by_name;
        }
        resolved_ips
            .iter()
            .map(|ip| self.check_ip(*ip))
            .find(|r| !r.is_allowed())
            .unwrap_or(FilterResult::Allow)
    }
}

fn normalize_name(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// IPv4-mapped IPv6 addresses are checked as the IPv4 address they carry.
fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}
