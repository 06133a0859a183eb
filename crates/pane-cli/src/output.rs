//! CLI output styling for pane

use colored::Colorize;
use pane::{FilterResult, Rejection, Validation};
use pane_proxy::ProxyConfig;
use serde_json::json;

/// Print the pane banner
pub fn print_banner(silent: bool) {
    if silent {
        return;
    }

    let version = env!("CARGO_PKG_VERSION");

    // Window glyph in slate blue
    let frame_top = "\u{250c}\u{2500}\u{252c}\u{2500}\u{2510}".truecolor(90, 110, 160); // ┌─┬─┐
    let frame_bottom = "\u{2514}\u{2500}\u{2534}\u{2500}\u{2518}".truecolor(90, 110, 160); // └─┴─┘

    let title = "pane".truecolor(70, 130, 200).bold();
    let ver = format!("v{}", version).white();

    eprintln!();
    eprintln!(" {} {} {}", frame_top, title, ver);
    eprintln!(
        " {} {}",
        frame_bottom,
        "a window onto the web, through a proxy".truecolor(150, 150, 150)
    );
    eprintln!();
}

/// Print where the server is listening and how pages will be linked.
pub fn print_serving(addr: &std::net::SocketAddr, config: &ProxyConfig, silent: bool) {
    if silent {
        return;
    }

    eprintln!("{} http://{}/", "Listening on".white().bold(), addr);
    match &config.public_endpoint {
        Some(endpoint) => eprintln!("  {} {}", "endpoint:".dimmed(), endpoint),
        None => eprintln!("  {} {}", "endpoint:".dimmed(), "from Host header".dimmed()),
    }
    eprintln!(
        "  {} {}s, {} redirects max, dns check {}",
        "upstream:".dimmed(),
        config.request_timeout_secs,
        config.max_redirects,
        if config.resolve_dns { "on" } else { "off" }
    );
    if !config.deny_hosts.is_empty() || !config.deny_cidrs.is_empty() {
        eprintln!(
            "  {} {} extra hosts, {} extra ranges denied",
            "filter:".dimmed(),
            config.deny_hosts.len(),
            config.deny_cidrs.len()
        );
    }
    eprintln!("{}", "Press Ctrl-C to stop.".dimmed());
    eprintln!();
}

/// Why a rejected URL was rejected, with the filter detail when there is one.
fn rejection_detail(reason: Rejection, detail: Option<&FilterResult>) -> String {
    match detail {
        Some(result) => format!("{} ({})", reason, result.reason()),
        None => reason.to_string(),
    }
}

/// Print the validator decision for `pane check`.
pub fn print_check(url: &str, validation: &Validation) {
    match validation {
        Validation::Allowed(parsed) => {
            println!("{} {}", "ALLOWED".green().bold(), parsed);
        }
        Validation::Rejected { reason, detail } => {
            println!(
                "{} {}: {}",
                "DENIED".red().bold(),
                url,
                rejection_detail(*reason, detail.as_ref())
            );
        }
    }
}

/// JSON form of a validator decision for `pane check --json`.
pub fn check_json(url: &str, validation: &Validation) -> serde_json::Value {
    match validation {
        Validation::Allowed(parsed) => json!({
            "url": url,
            "allowed": true,
            "normalized": parsed.as_str(),
        }),
        Validation::Rejected { reason, detail } => json!({
            "url": url,
            "allowed": false,
            "error": reason.to_string(),
            "detail": detail,
        }),
    }
}
