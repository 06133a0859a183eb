//! Upstream fetching.
//!
//! [`Fetcher`] retrieves a validated target URL the way a desktop browser
//! would, following redirects by hand so every hop is validated before it
//! is contacted. The server talks to it through the [`Upstream`] trait.

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::filter::ProxyFilter;
use async_trait::async_trait;
use pane::{Rejection, Validation, Validator};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use std::borrow::Cow;
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::debug;
use url::{Host, Url};

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// What an upstream site answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub status: u16,
    /// Raw `Content-Type` header value, empty when absent.
    pub content_type: String,
    /// Response body. Empty for non-2xx responses, which are not read.
    pub body: Vec<u8>,
    /// URL the body came from, after redirects.
    pub final_url: Url,
}

impl FetchResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Media type without parameters, lowercased.
    #[must_use]
    pub fn media_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }

    /// Whether the body is an HTML document that should be rewritten.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.media_type() == "text/html"
    }

    /// Whether the body is text that can be returned as a string. An
    /// unlabelled body counts as text.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        let media = self.media_type();
        media.is_empty()
            || media.starts_with("text/")
            || media.ends_with("+xml")
            || media.ends_with("+json")
            || matches!(
                media.as_str(),
                "application/json"
                    | "application/javascript"
                    | "application/x-javascript"
                    | "application/xml"
            )
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Why an upstream fetch failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A redirect pointed at a denied destination
    #[error("Redirect to {url} blocked: {reason}")]
    Blocked { url: String, reason: String },

    /// A redirect could not be followed
    #[error("Invalid redirect from {from}: {reason}")]
    Redirect { from: String, reason: String },

    #[error("Too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("Request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("{0}")]
    Transport(String),

    #[error("Response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether the failure is a refusal to contact an internal destination.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked { .. })
    }
}

/// Source of upstream responses.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch an already validated URL.
    async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError>;
}

/// reqwest-backed [`Upstream`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    validator: Validator,
    filter: ProxyFilter,
    timeout: Duration,
    max_redirects: usize,
    max_body_bytes: usize,
    user_agent: String,
    resolve_dns: bool,
}

impl Fetcher {
    pub fn new(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let filter = config.host_filter();
        let mut fetcher = Self {
            client: reqwest::Client::new(),
            validator: Validator::new(filter.clone()),
            filter: ProxyFilter::new(filter),
            timeout: config.request_timeout(),
            max_redirects: config.max_redirects,
            max_body_bytes: config.max_body_bytes,
            user_agent: config.user_agent.clone(),
            resolve_dns: config.resolve_dns,
        };
        fetcher.client = fetcher
            .client_builder()
            .build()
            .map_err(|e| ProxyError::Client(e.to_string()))?;
        Ok(fetcher)
    }

    fn client_builder(&self) -> reqwest::ClientBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .user_agent(self.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(self.timeout)
            .timeout(self.timeout);
        if self.resolve_dns {
            // A system proxy would resolve the name itself.
            builder = builder.no_proxy();
        }
        builder
    }

    /// Client for one hop. With DNS checking on, named hosts are resolved
    /// and checked here, and the client is pinned to the checked addresses.
    async fn client_for(&self, url: &Url) -> Result<reqwest::Client, FetchError> {
        if !self.resolve_dns {
            return Ok(self.client.clone());
        }
        let Some(Host::Domain(name)) = url.host() else {
            return Ok(self.client.clone());
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let check = self.filter.check_host(name, port).await;
        if !check.result.is_allowed() {
            return Err(FetchError::Blocked {
                url: url.to_string(),
                reason: check.result.reason(),
            });
        }
        if check.resolved_addrs.is_empty() {
            return Ok(self.client.clone());
        }

        self.client_builder()
            .resolve_to_addrs(name, &check.resolved_addrs)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))
    }

    async fn send(&self, url: &Url, deadline: Instant) -> Result<reqwest::Response, FetchError> {
        let client = timeout_at(deadline, self.client_for(url))
            .await
            .map_err(|_| self.timed_out(url))??;

        match timeout_at(deadline, client.get(url.clone()).send()).await {
            Err(_) => Err(self.timed_out(url)),
            Ok(Err(e)) if e.is_timeout() => Err(self.timed_out(url)),
            Ok(Err(e)) => Err(FetchError::Transport(describe(&e))),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// Where a redirect response points, validated.
    fn next_hop(&self, from: &Url, response: &reqwest::Response) -> Result<Url, FetchError> {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if location.is_empty() {
            return Err(FetchError::Redirect {
                from: from.to_string(),
                reason: "missing Location header".to_string(),
            });
        }
        let next = from.join(location).map_err(|e| FetchError::Redirect {
            from: from.to_string(),
            reason: format!("bad Location '{location}': {e}"),
        })?;

        match self.validator.validate_url(next.clone()) {
            Validation::Allowed(url) => Ok(url),
            Validation::Rejected {
                reason: Rejection::BlockedHost,
                detail,
            } => Err(FetchError::Blocked {
                url: next.to_string(),
                reason: detail.map_or_else(|| Rejection::BlockedHost.to_string(), |d| d.reason()),
            }),
            Validation::Rejected { reason, .. } => Err(FetchError::Redirect {
                from: from.to_string(),
                reason: format!("{reason}: {next}"),
            }),
        }
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
        url: &Url,
        deadline: Instant,
    ) -> Result<Vec<u8>, FetchError> {
        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes as u64 {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
        }

        let mut body = Vec::new();
        loop {
            let chunk = match timeout_at(deadline, response.chunk()).await {
                Err(_) => return Err(self.timed_out(url)),
                Ok(Err(e)) => return Err(FetchError::Transport(describe(&e))),
                Ok(Ok(None)) => break,
                Ok(Ok(Some(chunk))) => chunk,
            };
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn timed_out(&self, url: &Url) -> FetchError {
        FetchError::Timeout {
            url: url.to_string(),
            secs: self.timeout.as_secs(),
        }
    }
}

#[async_trait]
impl Upstream for Fetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let deadline = Instant::now() + self.timeout;
        let mut current = url.clone();
        let mut hops = 0usize;

        loop {
            let response = self.send(&current, deadline).await?;
            let status = response.status().as_u16();

            if is_redirect(status) {
                hops += 1;
                if hops > self.max_redirects {
                    return Err(FetchError::TooManyRedirects {
                        limit: self.max_redirects,
                    });
                }
                let next = self.next_hop(&current, &response)?;
                debug!("Following redirect {} -> {}", current, next);
                current = next;
                continue;
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            let body = if (200..300).contains(&status) {
                self.read_body(response, &current, deadline).await?
            } else {
                Vec::new()
            };

            return Ok(FetchResult {
                status,
                content_type,
                body,
                final_url: current,
            });
        }
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Error message including the underlying causes, which reqwest keeps out of
/// its top-level `Display`.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
