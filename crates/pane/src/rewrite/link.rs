//! Mapping of document references to proxy URLs.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters left alone by JavaScript's `encodeURIComponent`.
pub const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Resolves references found in a document against the page URL and wraps
/// them as `{endpoint}?url={encoded absolute URL}`.
///
/// The server-side attribute pass and the injected script apply the same
/// mapping, so a value is never wrapped twice.
#[derive(Debug, Clone)]
pub struct ProxyLinker<'a> {
    prefix: String,
    base: &'a Url,
}

impl<'a> ProxyLinker<'a> {
    #[must_use]
    pub fn new(endpoint: &str, base: &'a Url) -> Self {
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        Self {
            prefix: format!("{endpoint}{separator}url="),
            base,
        }
    }

    /// The string every proxied URL starts with.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The page URL references are resolved against.
    #[must_use]
    pub fn base(&self) -> &Url {
        self.base
    }

    /// Whether a reference already points at the proxy.
    #[must_use]
    pub fn is_proxied(&self, value: &str) -> bool {
        value.trim().starts_with(&self.prefix)
    }

    /// Proxy form of `raw`, or `None` when the reference must be left as is:
    /// empty, already proxied, unresolvable, or not an http(s) resource
    /// (`data:`, `mailto:`, `blob:` …).
    #[must_use]
    pub fn to_proxy(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || self.is_proxied(raw) {
            return None;
        }
        let absolute = self.base.join(raw).ok()?;
        if !matches!(absolute.scheme(), "http" | "https") || self.is_proxied(absolute.as_str()) {
            return None;
        }
        Some(format!(
            "{}{}",
            self.prefix,
            utf8_percent_encode(absolute.as_str(), URI_COMPONENT)
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "https://proxy.test/functions/v1/web-proxy";

    fn page() -> Url {
        Url::parse("https://ex.com/docs/page.html?x=1").unwrap()
    }

    #[test]
    fn test_root_relative() {
        let base = page();
        let linker = ProxyLinker::new(ENDPOINT, &base);
        assert_eq!(
            linker.to_proxy("/a.png").unwrap(),
            format!("{ENDPOINT}?url=https%3A%2F%2Fex.com%2Fa.png")
        );
    }

    #[test]
    fn test_path_relative_and_absolute() {
        let base = page();
        let linker = ProxyLinker::new(ENDPOINT, &base);
        assert_eq!(
            linker.to_proxy("img/b.png").unwrap(),
            format!("{ENDPOINT}?url=https%3A%2F%2Fex.com%2Fdocs%2Fimg%2Fb.png")
        );
        assert_eq!(
            linker.to_proxy("//cdn.ex.com/app.js?v=2&t=3").unwrap(),
            format!("{ENDPOINT}?url=https%3A%2F%2Fcdn.ex.com%2Fapp.js%3Fv%3D2%26t%3D3")
        );
    }

    #[test]
    fn test_encodes_like_encode_uri_component() {
        let base = page();
        let linker = ProxyLinker::new(ENDPOINT, &base);
        let proxied = linker.to_proxy("/it's(fine)!*~_-.x").unwrap();
        assert!(proxied.ends_with("%2Fit's(fine)!*~_-.x"), "{proxied}");
    }

    #[test]
    fn test_already_proxied_left_alone() {
        let base = page();
        let linker = ProxyLinker::new(ENDPOINT, &base);
        let once = linker.to_proxy("/a.png").unwrap();
        assert!(linker.is_proxied(&once));
        assert_eq!(linker.to_proxy(&once), None);
    }

    #[test]
    fn test_non_http_references_left_alone() {
        let base = page();
        let linker = ProxyLinker::new(ENDPOINT, &base);
        assert_eq!(linker.to_proxy("data:image/png;base64,AAAA"), None);
        assert_eq!(linker.to_proxy("mailto:someone@ex.com"), None);
        assert_eq!(linker.to_proxy("javascript:void(0)"), None);
        assert_eq!(linker.to_proxy("   "), None);
    }

    #[test]
    fn test_unresolvable_reference_left_alone() {
        let base = page();
        let linker = ProxyLinker::new(ENDPOINT, &base);
        assert_eq!(linker.to_proxy("http://[::1"), None);
    }

    #[test]
    fn test_endpoint_with_query_uses_ampersand() {
        let base = page();
        let linker = ProxyLinker::new("https://proxy.test/p?key=abc", &base);
        assert_eq!(linker.prefix(), "https://proxy.test/p?key=abc&url=");
    }
}
