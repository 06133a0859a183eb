//! Async host filtering wrapping the library's [`HostFilter`](pane::HostFilter).
//!
//! Performs DNS resolution via `tokio::net::lookup_host()` and checks the
//! resolved IPs against the deny ranges, so a public name pointing at an
//! internal address is refused.

use pane::net_filter::{FilterResult, HostFilter};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// Result of a filter check including resolved socket addresses.
///
/// When the filter allows a host, `resolved_addrs` contains the DNS-resolved
/// addresses. Callers MUST connect to these addresses (not re-resolve the
/// hostname) so a second lookup cannot return a different answer.
#[derive(Debug)]
pub struct CheckResult {
    /// The filter decision
    pub result: FilterResult,
    /// DNS-resolved addresses (empty if denied or DNS failed)
    pub resolved_addrs: Vec<SocketAddr>,
}

/// Async wrapper around `HostFilter` that performs DNS resolution.
#[derive(Debug, Clone, Default)]
pub struct ProxyFilter {
    inner: HostFilter,
}

impl ProxyFilter {
    #[must_use]
    pub fn new(inner: HostFilter) -> Self {
        Self { inner }
    }

    /// Check a host against the filter with async DNS resolution.
    ///
    /// A lookup failure is not a denial: the name is still checked against
    /// the deny list, and the empty address list makes the caller's own
    /// connection attempt fail.
    pub async fn check_host(&self, host: &str, port: u16) -> CheckResult {
        let by_name = self.inner.check_name(host);
        if !by_name.is_allowed() {
            return CheckResult {
                result: by_name,
                resolved_addrs: Vec::new(),
            };
        }

        let resolved: Vec<SocketAddr> = match tokio::net::lookup_host((host, port)).await {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                debug!("DNS resolution failed for {}: {}", host, e);
                Vec::new()
            }
        };

        let resolved_ips: Vec<IpAddr> = resolved.iter().map(|a| a.ip()).collect();
        let result = self.inner.check_resolved(host, &resolved_ips);

        // Only return resolved addrs on allow to prevent misuse
        let addrs = if result.is_allowed() {
            resolved
        } else {
            Vec::new()
        };

        CheckResult {
            result,
            resolved_addrs: addrs,
        }
    }
}
