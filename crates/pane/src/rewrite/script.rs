//! The client-side rewriter script injected into proxied pages.
//!
//! The server never runs this script; it only fills in the two values the
//! script needs and embeds it. In the page, the script applies the same
//! mapping as [`ProxyLinker`] to the live DOM, once on load and again on
//! every mutation, so elements added after load are routed through the
//! proxy too.

use super::link::ProxyLinker;

const INJECTOR_TEMPLATE: &str = include_str!("injector.js");

/// Render the injector `<script>` element for a page.
#[must_use]
pub fn injector_script(linker: &ProxyLinker<'_>) -> String {
    INJECTOR_TEMPLATE
        .trim_end()
        .replace("{{PROXY_PREFIX}}", &js_string(linker.prefix()))
        .replace("{{TARGET_URL}}", &js_string(linker.base().as_str()))
}

/// Quote `value` as a JavaScript string literal that is also safe inside an
/// HTML `<script>` element.
fn js_string(value: &str) -> String {
    // Serializing a str cannot fail; fall back to an empty literal anyway.
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace("</", "<\\/")
        .replace("<!--", "<\\!--")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_script_carries_prefix_and_target() {
        let base = Url::parse("https://ex.com/p").unwrap();
        let linker = ProxyLinker::new("https://proxy.test/fn", &base);
        let script = injector_script(&linker);

        assert!(script.starts_with("<script data-pane-rewriter>"));
        assert!(script.ends_with("</script>"));
        assert!(script.contains(r#"var prefix = "https://proxy.test/fn?url=";"#));
        assert!(script.contains(r#"var target = "https://ex.com/p";"#));
        assert!(!script.contains("{{"));
    }

    #[test]
    fn test_script_behaviour_markers() {
        let base = Url::parse("https://ex.com/").unwrap();
        let script = injector_script(&ProxyLinker::new("/proxy", &base));
        for marker in [
            "function toProxy(raw)",
            "function rewrite()",
            "data-original-",
            "a[href]",
            "form[action]",
            "link[rel~=\"stylesheet\" i][href]",
            "img[src], script[src], iframe[src], video[src], audio[src], source[src]",
            "DOMContentLoaded",
            "new MutationObserver(rewrite)",
            "attributeFilter: ['src', 'href']",
        ] {
            assert!(script.contains(marker), "missing {marker}");
        }
    }

    #[test]
    fn test_values_cannot_close_the_script() {
        let base = Url::parse("https://ex.com/").unwrap();
        let linker = ProxyLinker::new("https://p.test/x</script><img src=x>", &base);
        let script = injector_script(&linker);
        assert_eq!(script.matches("</script>").count(), 1);
        assert!(script.contains(r#"x<\/script><img src=x>?url="#));
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a"b'c"#), r#""a\"b'c""#);
        assert_eq!(js_string("<!--"), r#""<\!--""#);
    }
}
