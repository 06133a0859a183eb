//! Minimal HTTP/1.1 request parsing for the proxy endpoint.

use crate::error::{ProxyError, Result};
use url::Url;

/// Parse an HTTP request line into (method, target, version).
pub fn parse_request_line(line: &str) -> Result<(String, String, String)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(ProxyError::HttpParse(format!(
            "malformed request line: {}",
            line
        )));
    }
    Ok((
        parts[0].to_string(),
        parts[1].to_string(),
        parts[2].to_string(),
    ))
}

/// Value of the first header named `name` (case-insensitive) in raw headers.
pub fn header_value<'h>(header_bytes: &'h [u8], name: &str) -> Option<&'h str> {
    let header_str = std::str::from_utf8(header_bytes).ok()?;
    header_str.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

/// Extract Content-Length value from raw headers.
pub fn extract_content_length(header_bytes: &[u8]) -> Option<usize> {
    header_value(header_bytes, "content-length")?.parse().ok()
}

/// Path part of a request target, without the query.
pub fn target_path(target: &str) -> &str {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}

/// Decoded value of query parameter `name` in a request target.
pub fn query_param(target: &str, name: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Proxy endpoint URL as seen by the client that sent this request.
///
/// The configured public endpoint wins. Otherwise the endpoint is rebuilt
/// from the `Host` header and the request path, falling back to the local
/// listening address when the header is missing or unusable.
pub fn endpoint_for(
    public_endpoint: Option<&str>,
    host_header: Option<&str>,
    local_addr: &str,
    target: &str,
) -> String {
    if let Some(endpoint) = public_endpoint {
        return endpoint.to_string();
    }
    let path = target_path(target);
    let path = if path.starts_with('/') { path } else { "/" };
    let authority = host_header
        .filter(|h| Url::parse(&format!("http://{h}/")).is_ok())
        .unwrap_or(local_addr);
    format!("http://{authority}{path}")
}
