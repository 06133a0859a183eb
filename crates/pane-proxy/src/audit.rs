//! Audit logging for proxy requests.
//!
//! Logs every proxied request with structured fields via `tracing`.
//! Only the target host is recorded, never the full URL, which may carry
//! user data in its path or query.

use tracing::info;

/// How the request reached the proxy, for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// POST with a JSON body, answered with the JSON envelope
    Envelope,
    /// GET `?url=`, answered with the raw resource
    Resource,
}

impl std::fmt::Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestMode::Envelope => write!(f, "envelope"),
            RequestMode::Resource => write!(f, "resource"),
        }
    }
}

/// Log a target refused before any fetch.
pub fn log_denied(mode: RequestMode, host: &str, reason: &str) {
    info!(
        target: "pane_proxy::audit",
        mode = %mode,
        host = host,
        decision = "deny",
        reason = reason,
        "proxy request denied"
    );
}

/// Log a completed upstream fetch.
pub fn log_fetched(mode: RequestMode, host: &str, status: u16, bytes: usize, rewritten: bool) {
    info!(
        target: "pane_proxy::audit",
        mode = %mode,
        host = host,
        decision = "allow",
        status = status,
        bytes = bytes,
        rewritten = rewritten,
        "proxy request completed"
    );
}

/// Log an upstream fetch that failed without a response.
pub fn log_failed(mode: RequestMode, host: &str, error: &str) {
    info!(
        target: "pane_proxy::audit",
        mode = %mode,
        host = host,
        decision = "allow",
        error = error,
        "proxy request failed"
    );
}
