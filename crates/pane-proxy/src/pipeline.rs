//! Request pipeline: validate the target, fetch it, rewrite HTML, and map
//! the outcome onto a reply.

use crate::audit::{self, RequestMode};
use crate::fetch::{FetchError, FetchResult, Upstream};
use crate::response::{ProxyResponse, Reply};
use pane::{Rejection, Validation, Validator};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Error message for a request without a usable `url`.
pub const URL_REQUIRED: &str = "URL is required";

#[derive(Debug, Deserialize)]
struct ProxyRequest {
    #[serde(default)]
    url: Option<String>,
}

/// Target URL named by a POST body, if any.
///
/// A body that is not JSON, lacks `url`, or carries an empty or non-string
/// `url` names no target.
#[must_use]
pub fn request_url(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ProxyRequest>(body)
        .ok()?
        .url
        .filter(|url| !url.is_empty())
}

/// What happened to one proxied request.
#[derive(Debug)]
pub enum Outcome {
    MissingUrl,
    Rejected(Rejection),
    /// The site answered with a non-2xx status
    UpstreamStatus(u16),
    Failed(FetchError),
    /// The document was fetched but could not be rewritten
    Unrewritable(String),
    /// Rewritten HTML document
    Document(String),
    /// Any other successful body, untouched
    Resource(FetchResult),
}

impl Outcome {
    /// Reply for the POST interface.
    #[must_use]
    pub fn into_envelope(self) -> Reply {
        match self {
            Outcome::Document(html) => Reply::json(200, &ProxyResponse::page(html)),
            Outcome::Resource(result) if result.is_textual() => Reply::json(
                200,
                &ProxyResponse::page(result.text().into_owned()),
            ),
            Outcome::Resource(result) => Reply::json(200, &ProxyResponse::binary(&result.body)),
            Outcome::UpstreamStatus(status) => {
                Reply::json(200, &ProxyResponse::upstream_status(status))
            }
            other => other.into_error(),
        }
    }

    /// Reply for the GET `?url=` interface: bodies pass through as is.
    #[must_use]
    pub fn into_resource(self) -> Reply {
        match self {
            Outcome::Document(html) => {
                Reply::raw(200, "text/html; charset=utf-8", html.into_bytes())
            }
            Outcome::Resource(result) => Reply::raw(result.status, result.content_type, result.body),
            Outcome::UpstreamStatus(status) => {
                let status = if status >= 400 { status } else { 502 };
                Reply::json(status, &ProxyResponse::upstream_status(status))
            }
            other => other.into_error(),
        }
    }

    fn into_error(self) -> Reply {
        match self {
            Outcome::MissingUrl => Reply::error(400, URL_REQUIRED),
            Outcome::Rejected(reason @ Rejection::BlockedHost) => {
                Reply::error(403, reason.to_string())
            }
            Outcome::Rejected(reason) => Reply::error(400, reason.to_string()),
            Outcome::Failed(e) if e.is_blocked() => {
                Reply::error(403, Rejection::BlockedHost.to_string())
            }
            Outcome::Failed(e) => Reply::error(500, e.to_string()),
            Outcome::Unrewritable(message) => Reply::error(500, message),
            Outcome::Document(_) | Outcome::Resource(_) | Outcome::UpstreamStatus(_) => {
                Reply::error(500, "Unexpected outcome")
            }
        }
    }
}

/// Validates, fetches and rewrites. One per server, shared by all
/// connections.
pub struct Pipeline {
    validator: Validator,
    upstream: Arc<dyn Upstream>,
}

impl Pipeline {
    #[must_use]
    pub fn new(validator: Validator, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            validator,
            upstream,
        }
    }

    /// Run one target through validation, fetch and rewrite.
    pub async fn run(&self, raw_url: &str, endpoint: &str, mode: RequestMode) -> Outcome {
        let url = match self.validator.validate(raw_url) {
            Validation::Allowed(url) => url,
            Validation::Rejected { reason, detail } => {
                let why = detail.map_or_else(|| reason.to_string(), |d| d.reason());
                audit::log_denied(mode, &host_of(raw_url), &why);
                return Outcome::Rejected(reason);
            }
        };
        let host = url.host_str().unwrap_or_default().to_string();

        let result = match self.upstream.fetch(&url).await {
            Ok(result) => result,
            Err(e) => {
                audit::log_failed(mode, &host, &e.to_string());
                return Outcome::Failed(e);
            }
        };

        if !result.is_success() {
            audit::log_fetched(mode, &host, result.status, 0, false);
            return Outcome::UpstreamStatus(result.status);
        }

        if result.is_html() {
            let size = result.body.len();
            return match rewrite_document(&result, endpoint).await {
                Ok(html) => {
                    audit::log_fetched(mode, &host, result.status, size, true);
                    Outcome::Document(html)
                }
                Err(e) => {
                    audit::log_failed(mode, &host, &e);
                    Outcome::Unrewritable(e)
                }
            };
        }

        audit::log_fetched(mode, &host, result.status, result.body.len(), false);
        Outcome::Resource(result)
    }

    /// Handle a POST body.
    pub async fn handle_envelope(&self, body: &[u8], endpoint: &str) -> Reply {
        match request_url(body) {
            Some(raw_url) => self
                .run(&raw_url, endpoint, RequestMode::Envelope)
                .await
                .into_envelope(),
            None => Outcome::MissingUrl.into_envelope(),
        }
    }

    /// Handle a GET `?url=` request.
    pub async fn handle_resource(&self, raw_url: Option<&str>, endpoint: &str) -> Reply {
        match raw_url.filter(|url| !url.is_empty()) {
            Some(raw_url) => self
                .run(raw_url, endpoint, RequestMode::Resource)
                .await
                .into_resource(),
            None => Outcome::MissingUrl.into_resource(),
        }
    }
}

/// Rewrite a fetched document on the blocking pool; a large page must not
/// hold an async worker.
async fn rewrite_document(result: &FetchResult, endpoint: &str) -> Result<String, String> {
    let html = result.text().into_owned();
    let final_url = result.final_url.clone();
    let endpoint = endpoint.to_string();
    let task = tokio::task::spawn_blocking(move || pane::rewrite(&html, &final_url, &endpoint));
    match task.await {
        Ok(rewritten) => rewritten.map_err(|e| e.to_string()),
        Err(e) => Err(format!("HTML rewriting failed: {e}")),
    }
}

fn host_of(raw_url: &str) -> String {
    Url::parse(raw_url.trim())
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "-".to_string())
}
