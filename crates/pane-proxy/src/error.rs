//! Error types for the pane-proxy crate.

use thiserror::Error;

/// Errors that can occur while setting up or running the proxy server.
///
/// Failures of an individual proxied fetch are not `ProxyError`s: they are
/// reported to the client in the response envelope (see
/// [`FetchError`](crate::fetch::FetchError)).
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Proxy bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP parse error: {0}")]
    HttpParse(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
