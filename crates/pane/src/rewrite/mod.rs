//! HTML rewriting for proxied documents.
//!
//! [`rewrite`] streams the document through `lol_html` once and applies:
//!
//! - Resource attributes (`a[href]`, stylesheet `link[href]`,
//!   `form[action]`, `src` on images, scripts, frames and media) are
//!   pointed at the proxy, keeping the raw value in `data-original-*`.
//! - A `<base href>` for the page origin is prepended to `<head>`. A page
//!   without one gets a `<head>` synthesized in front of its first element
//!   other than `<html>`.
//! - Framing and CSP `<meta http-equiv>` directives are removed.
//! - The injector script is placed before `</head>`, else before
//!   `</body>`, else at the end of the document.
//!
//! Markup inside comments and `<script>`/`<style>` text is never matched.
//! Malformed or partial documents come back with every step that could be
//! applied.

mod link;
mod markup;
mod script;

pub use link::{ProxyLinker, URI_COMPONENT};
pub use script::injector_script;

use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, Element, EndTag};
use lol_html::{element, end, HandlerResult, HtmlRewriter, Settings};
use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("HTML rewriting failed: {0}")]
    Rewriting(#[from] RewritingError),
}

/// Rewrite `html`, fetched from `final_url`, so its resources load
/// through `proxy_endpoint`.
pub fn rewrite(
    html: &str,
    final_url: &Url,
    proxy_endpoint: &str,
) -> Result<String, RewriteError> {
    let linker = ProxyLinker::new(proxy_endpoint, final_url);
    let base = format!(
        r#"<base href="{}/">"#,
        final_url.origin().ascii_serialization()
    );
    let script: Rc<str> = Rc::from(injector_script(&linker));
    let head_placed = Cell::new(false);
    let script_placed = Rc::new(Cell::new(false));

    let mut handlers = vec![
        element!("*", |el| {
            if head_placed.get() {
                return Ok(());
            }
            let tag = el.tag_name();
            if tag.eq_ignore_ascii_case("html") {
                return Ok(());
            }
            head_placed.set(true);
            if tag.eq_ignore_ascii_case("head") {
                el.prepend(&base, ContentType::Html);
            } else {
                debug!(before = %tag, "document has no <head>, synthesizing one");
                el.before(&format!("<head>{base}{script}</head>"), ContentType::Html);
                script_placed.set(true);
            }
            Ok(())
        }),
        element!("head", |el| {
            inject_before_end_tag(el, &script, &script_placed);
            Ok(())
        }),
        element!("body", |el| {
            inject_before_end_tag(el, &script, &script_placed);
            Ok(())
        }),
        element!("meta[http-equiv]", |el| {
            if el
                .get_attribute("http-equiv")
                .is_some_and(|name| markup::is_frame_directive(&name))
            {
                el.remove();
            }
            Ok(())
        }),
        element!("a[href]", |el| {
            if !el
                .get_attribute("href")
                .is_some_and(|href| markup::is_inert_link(&href))
            {
                markup::proxy_attribute(el, "href", &linker);
            }
            Ok(())
        }),
        element!("link[href]", |el| {
            if el
                .get_attribute("rel")
                .is_some_and(|rel| markup::is_stylesheet(&rel))
            {
                markup::proxy_attribute(el, "href", &linker);
            }
            Ok(())
        }),
        element!("form[action]", |el| {
            markup::proxy_attribute(el, "action", &linker);
            Ok(())
        }),
    ];
    let linker = &linker;
    handlers.extend(markup::SRC_TAGS.iter().map(|tag| {
        element!(format!("{tag}[src]"), move |el| {
            markup::proxy_attribute(el, "src", linker);
            Ok(())
        })
    }));

    let mut output = Vec::with_capacity(html.len() + html.len() / 8 + script.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            document_content_handlers: vec![end!(|end| {
                if !head_placed.get() {
                    debug!("document has no elements, appending <head>");
                    end.append(&format!("<head>{base}</head>"), ContentType::Html);
                }
                if !script_placed.replace(true) {
                    debug!("document has no </head> or </body>, appending injector");
                    end.append(&script, ContentType::Html);
                }
                Ok(())
            })],
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;
    Ok(String::from_utf8(output)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Place the injector right before `el`'s end tag unless it already sits
/// somewhere in the document.
fn inject_before_end_tag(
    el: &mut Element<'_, '_>,
    script: &Rc<str>,
    placed: &Rc<Cell<bool>>,
) {
    let Some(handlers) = el.end_tag_handlers() else {
        return;
    };
    let script = Rc::clone(script);
    let placed = Rc::clone(placed);
    handlers.push(Box::new(move |end: &mut EndTag<'_>| -> HandlerResult {
        if !placed.replace(true) {
            end.before(&script, ContentType::Html);
        }
        Ok(())
    }));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    const ENDPOINT: &str = "https://proxy.test/functions/v1/web-proxy";

    fn rewrite_at(html: &str, page: &str) -> String {
        rewrite(html, &Url::parse(page).unwrap(), ENDPOINT).unwrap()
    }

    /// (tag, attribute name, value) for every attribute in the document.
    fn attributes(html: &str) -> Vec<(String, String, String)> {
        let mut found = Vec::new();
        let mut scanner = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![element!("*", |el| {
                    let tag = el.tag_name().to_ascii_lowercase();
                    for attr in el.attributes() {
                        found.push((tag.clone(), attr.name().to_ascii_lowercase(), attr.value()));
                    }
                    Ok(())
                })],
                ..Settings::default()
            },
            |_: &[u8]| {},
        );
        scanner.write(html.as_bytes()).unwrap();
        scanner.end().unwrap();
        found
    }

    fn attribute(html: &str, tag: &str, name: &str) -> Option<String> {
        attributes(html)
            .into_iter()
            .find(|(t, n, _)| t == tag && n == name)
            .map(|(_, _, v)| v)
    }

    #[test]
    fn test_reference_document() {
        let out = rewrite_at(
            r#"<head></head><body><img src="/a.png"></body>"#,
            "https://ex.com/p",
        );

        assert!(out.contains(r#"<head><base href="https://ex.com/">"#));
        assert!(out.contains("<script data-pane-rewriter>"));
        assert_eq!(attribute(&out, "img", "data-original-src").unwrap(), "/a.png");
        assert_eq!(
            attribute(&out, "img", "src").unwrap(),
            format!("{ENDPOINT}?url=https%3A%2F%2Fex.com%2Fa.png")
        );
    }

    #[test]
    fn test_base_inserted_right_after_head() {
        let out = rewrite_at(
            r#"<html><HEAD lang="en"><title>t</title></HEAD><body></body></html>"#,
            "http://ex.com:8080/deep/page",
        );
        assert!(out.contains(r#"<HEAD lang="en"><base href="http://ex.com:8080/"><title>"#));
        assert_eq!(out.matches("<base ").count(), 1);
    }

    #[test]
    fn test_head_synthesized_when_missing() {
        let out = rewrite_at("<html><body><p>hi</p></body></html>", "https://ex.com/");
        assert!(out.starts_with(r#"<html><head><base href="https://ex.com/">"#));
        // The script lands in the synthesized head.
        let head_end = out.find("</head>").unwrap();
        assert!(out.find("<script data-pane-rewriter>").unwrap() < head_end);
        assert_eq!(out.matches("<script data-pane-rewriter>").count(), 1);

        let out = rewrite_at("<!DOCTYPE html>\n<p>bare</p>", "https://ex.com/");
        assert!(out.starts_with("<!DOCTYPE html>\n<head><base href=\"https://ex.com/\">"));

        let out = rewrite_at("<p>fragment</p>", "https://ex.com/");
        assert!(out.starts_with(r#"<head><base href="https://ex.com/">"#));
    }

    #[test]
    fn test_synthesized_head_stays_after_bom_doctype() {
        let out = rewrite_at("\u{feff}<!DOCTYPE html><p>bare</p>", "https://ex.com/");
        let doctype = out.find("<!DOCTYPE html>").unwrap();
        assert!(!out[..doctype].contains('<'));
        assert!(doctype < out.find("<head><base").unwrap());
    }

    #[test]
    fn test_head_text_in_comment_or_script_is_not_head() {
        let out = rewrite_at(
            "<!-- <head> --><html><body>x</body></html>",
            "https://ex.com/",
        );
        assert!(out.starts_with(r#"<!-- <head> --><html><head><base href="https://ex.com/">"#));

        let out = rewrite_at(
            r#"<html><head><script>document.write("<head>")</script></head></html>"#,
            "https://ex.com/",
        );
        assert!(out.contains(r#"<script>document.write("<head>")</script>"#));
        assert!(out.starts_with(r#"<html><head><base href="https://ex.com/"><script>document"#));
        assert_eq!(out.matches("<base ").count(), 1);
    }

    #[test]
    fn test_header_element_is_not_head() {
        let out = rewrite_at("<body><header>x</header></body>", "https://ex.com/");
        assert!(out.contains("<header>x</header>"));
        assert!(out.starts_with("<head><base"));
    }

    #[test]
    fn test_script_falls_back_to_body_then_end() {
        let out = rewrite_at(
            "<head><title>t</title><body><p>x</p></body>",
            "https://ex.com/",
        );
        assert_eq!(out.matches("<script data-pane-rewriter>").count(), 1);
        let script = out.find("<script data-pane-rewriter>").unwrap();
        assert!(script < out.find("</body>").unwrap());
        assert!(script > out.find("<p>x</p>").unwrap());

        let out = rewrite_at("<head><title>t</title>just text", "https://ex.com/");
        assert!(out.ends_with("</script>"));
        assert_eq!(out.matches("<script data-pane-rewriter>").count(), 1);
    }

    #[test]
    fn test_frame_and_csp_meta_stripped() {
        let html = r#"<head>
<meta http-equiv="X-Frame-Options" content="DENY">
<meta HTTP-EQUIV='content-security-policy' content="frame-ancestors 'none'">
<meta http-equiv=Content-Security-Policy content="default-src 'self'">
<meta charset="utf-8">
<meta http-equiv="refresh" content="30">
</head>"#;
        let out = rewrite_at(html, "https://ex.com/");
        let lower = out.to_ascii_lowercase();
        assert!(!lower.contains("x-frame-options"));
        assert!(!lower.contains("content-security-policy"));
        assert!(out.contains(r#"<meta charset="utf-8">"#));
        assert!(out.contains(r#"<meta http-equiv="refresh" content="30">"#));
    }

    #[test]
    fn test_fragment_and_script_links_untouched() {
        let html = r##"<body><a href="#top">top</a><a href="javascript:void(0)">js</a><a href="/next">n</a></body>"##;
        let out = rewrite_at(html, "https://ex.com/");
        assert!(out.contains(r##"<a href="#top">top</a>"##));
        assert!(out.contains(r#"<a href="javascript:void(0)">js</a>"#));
        assert_eq!(attribute(&out, "a", "data-original-href").unwrap(), "/next");
    }

    #[test]
    fn test_all_resource_kinds() {
        let html = r#"<head><link rel="stylesheet" href="s.css"><link rel="icon" href="/f.ico"></head>
<body>
<form action="/search" method="get"></form>
<script src="/app.js"></script>
<iframe src="https://other.org/embed"></iframe>
<video src="v.mp4"><source src="v.webm"></video>
<audio src="a.mp3"></audio>
</body>"#;
        let out = rewrite_at(html, "https://ex.com/dir/");

        for (tag, attr, raw, abs) in [
            ("link", "href", "s.css", "https%3A%2F%2Fex.com%2Fdir%2Fs.css"),
            ("form", "action", "/search", "https%3A%2F%2Fex.com%2Fsearch"),
            ("script", "src", "/app.js", "https%3A%2F%2Fex.com%2Fapp.js"),
            ("iframe", "src", "https://other.org/embed", "https%3A%2F%2Fother.org%2Fembed"),
            ("video", "src", "v.mp4", "https%3A%2F%2Fex.com%2Fdir%2Fv.mp4"),
            ("source", "src", "v.webm", "https%3A%2F%2Fex.com%2Fdir%2Fv.webm"),
            ("audio", "src", "a.mp3", "https%3A%2F%2Fex.com%2Fdir%2Fa.mp3"),
        ] {
            assert_eq!(
                attribute(&out, tag, &format!("data-original-{attr}")).unwrap(),
                raw,
                "{tag}"
            );
            assert_eq!(
                attribute(&out, tag, attr).unwrap(),
                format!("{ENDPOINT}?url={abs}"),
                "{tag}"
            );
        }

        // Non-stylesheet links keep their href.
        assert!(out.contains(r#"<link rel="icon" href="/f.ico">"#));
    }

    #[test]
    fn test_shadow_attributes_round_trip() {
        let html = r#"<html><head><link rel="stylesheet" href='/s.css?v=1'></head>
<body>
<a href="/one">1</a><a class=x href=two.html>2</a><A HREF="HTTPS://EX.COM/Three">3</A>
<img src="/i.png" alt="it's"/><img src='q"uote.png'>
<form action="/f"></form>
</body></html>"#;
        let before: Vec<(String, String, String)> = attributes(html)
            .into_iter()
            .filter(|(t, n, _)| {
                matches!(
                    (t.as_str(), n.as_str()),
                    ("a" | "link", "href") | ("img", "src") | ("form", "action")
                )
            })
            .collect();
        let out = rewrite_at(html, "https://ex.com/");
        let shadows: Vec<(String, String, String)> = attributes(&out)
            .into_iter()
            .filter(|(_, n, _)| n.starts_with("data-original-"))
            .map(|(t, n, v)| {
                let name = n.trim_start_matches("data-original-").to_string();
                (t, name, v.replace("&quot;", "\""))
            })
            .collect();

        assert_eq!(before.len(), 7);
        assert_eq!(shadows, before);
    }

    #[test]
    fn test_values_with_references_left_to_the_script() {
        let out = rewrite_at(r#"<a href="/s?a=1&amp;b=2">x</a>"#, "https://ex.com/");
        assert!(out.contains(r#"<a href="/s?a=1&amp;b=2">x</a>"#));
        assert_eq!(attribute(&out, "a", "data-original-href"), None);
    }

    #[test]
    fn test_idempotent() {
        let html = r#"<head></head><body><a href="/x">x</a><img src="y.png"><form action="z"></form></body>"#;
        let page = Url::parse("https://ex.com/p/").unwrap();

        let once = rewrite(html, &page, ENDPOINT).unwrap();
        let twice = rewrite(&once, &page, ENDPOINT).unwrap();
        assert!(!twice.contains("url=https%3A%2F%2Fproxy.test"));
        for (tag, attr) in [("img", "src"), ("a", "href"), ("form", "action")] {
            let shadow = format!("data-original-{attr}");
            assert_eq!(attribute(&once, tag, attr), attribute(&twice, tag, attr));
            assert_eq!(attribute(&once, tag, &shadow), attribute(&twice, tag, &shadow));
        }
    }

    #[test]
    fn test_script_and_comment_bodies_untouched() {
        let html = r#"<head><script>var s = '<img src="/inline.png">';</script></head>
<body><!-- <a href="/commented">c</a> --><style>.a{background:url(x.png)}</style><img src="/real.png"></body>"#;
        let out = rewrite_at(html, "https://ex.com/");
        assert!(out.contains(r#"var s = '<img src="/inline.png">';"#));
        assert!(out.contains(r#"<!-- <a href="/commented">c</a> -->"#));
        assert!(out.contains(".a{background:url(x.png)}"));
        assert_eq!(attribute(&out, "img", "data-original-src").unwrap(), "/real.png");
    }

    #[test]
    fn test_stale_shadow_is_replaced() {
        let out = rewrite_at(
            r#"<img data-original-src="stale" src="/a.png" />"#,
            "https://ex.com/",
        );
        assert!(!out.contains("stale"));
        assert_eq!(attribute(&out, "img", "data-original-src").unwrap(), "/a.png");
    }

    #[test]
    fn test_data_and_empty_sources_untouched() {
        let html = r#"<img src="data:image/gif;base64,R0lGOD"><img src=""><img alt="none">"#;
        let out = rewrite_at(html, "https://ex.com/");
        assert!(out.contains(r#"<img src="data:image/gif;base64,R0lGOD">"#));
        assert!(out.contains(r#"<img src="">"#));
        assert!(out.contains(r#"<img alt="none">"#));
    }

    #[test]
    fn test_malformed_documents_do_not_fail() {
        for html in [
            "",
            "<",
            "<img src=",
            "<a href=\"/unterminated",
            "<head",
            "<script>never closed",
            "<!-- open comment",
            "<a href='x'",
            "\u{feff}<html>ünïcödé <img src=\"/ü.png\"></html>",
        ] {
            let out = rewrite_at(html, "https://ex.com/");
            assert_eq!(out.matches("<script data-pane-rewriter>").count(), 1, "{html:?}");
            assert!(out.contains(r#"<base href="https://ex.com/">"#), "{html:?}");
        }
    }

    #[test]
    fn test_unicode_reference_is_percent_encoded() {
        let out = rewrite_at(r#"<head></head><img src="/ü.png">"#, "https://ex.com/");
        assert_eq!(
            attribute(&out, "img", "src").unwrap(),
            format!("{ENDPOINT}?url=https%3A%2F%2Fex.com%2F%25C3%25BC.png")
        );
    }

    #[test]
    fn test_many_raw_text_elements_rewrite_in_linear_time() {
        let html = format!(
            "<html><head></head><body>{}<img src=\"/last.png\"></body></html>",
            "<script></script><style></style>".repeat(40_000)
        );
        let started = Instant::now();
        let out = rewrite_at(&html, "https://ex.com/");
        assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());

        assert_eq!(out.matches("<script></script>").count(), 40_000);
        assert_eq!(attribute(&out, "img", "data-original-src").unwrap(), "/last.png");
    }
}
