//! Turning what a user typed into a target URL.

use pane::rewrite::URI_COMPONENT;
use percent_encoding::utf8_percent_encode;

const SEARCH_URL: &str = "https://www.google.com/search?q=";

/// Normalize an address bar entry.
///
/// Input without a `.` or with a space is a search; input without an
/// `http://` or `https://` prefix gets `https://`. Empty input yields `None`.
pub fn normalize_address(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if !input.contains('.') || input.contains(' ') {
        return Some(format!(
            "{SEARCH_URL}{}",
            utf8_percent_encode(input, URI_COMPONENT)
        ));
    }
    if input.starts_with("http://") || input.starts_with("https://") {
        return Some(input.to_string());
    }
    Some(format!("https://{input}"))
}
