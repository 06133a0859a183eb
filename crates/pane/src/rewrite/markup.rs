//! Element-level rules for the server-side pass: which tags carry a
//! resource attribute, and how that attribute is pointed at the proxy.

use super::link::ProxyLinker;
use lol_html::html_content::Element;

/// Media and embed tags whose `src` is rewritten.
pub(super) const SRC_TAGS: [&str; 6] = ["img", "script", "iframe", "video", "audio", "source"];

/// Point `attr` of `el` at the proxy, keeping the raw value in
/// `data-original-<attr>`.
///
/// Values carrying an `&` are left to the injected script, which reads them
/// from the DOM with character references already decoded.
pub(super) fn proxy_attribute(el: &mut Element<'_, '_>, attr: &str, linker: &ProxyLinker<'_>) {
    let Some(raw) = el.get_attribute(attr) else {
        return;
    };
    if raw.contains('&') {
        return;
    }
    let Some(proxied) = linker.to_proxy(&raw) else {
        return;
    };

    // Only an invalid attribute name makes set_attribute fail.
    if el
        .set_attribute(&format!("data-original-{attr}"), &raw)
        .and_then(|()| el.set_attribute(attr, &proxied))
        .is_err()
    {
        tracing::debug!(attr, "could not rewrite attribute");
    }
}

/// `#fragment` and `javascript:` links never leave the page.
pub(super) fn is_inert_link(href: &str) -> bool {
    let href = href.trim();
    href.starts_with('#')
        || href
            .get(..11)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
}

/// Whether a `rel` value lists the `stylesheet` token.
pub(super) fn is_stylesheet(rel: &str) -> bool {
    rel.split_ascii_whitespace()
        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
}

/// `http-equiv` values that would stop the page from rendering in a frame.
pub(super) fn is_frame_directive(http_equiv: &str) -> bool {
    let name = http_equiv.trim();
    name.eq_ignore_ascii_case("x-frame-options")
        || name.eq_ignore_ascii_case("content-security-policy")
}
