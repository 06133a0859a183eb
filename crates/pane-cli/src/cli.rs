//! CLI argument definitions for pane
//!
//! Uses clap for argument parsing. This module defines all subcommands
//! and their options.

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// pane - browse the web through a rewriting content proxy
///
/// Fetches public pages on behalf of a browser front end and rewrites them
/// so that every resource they load goes back through the proxy. Requests
/// for internal infrastructure are refused.
#[derive(Parser, Debug)]
#[command(name = "pane")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Silent mode - suppress the banner and status output
    #[arg(long, short = 's', global = true)]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the proxy server until interrupted
    #[command(after_help = "EXAMPLES:
    # Serve on the default address (127.0.0.1:8787)
    pane serve

    # Listen on all interfaces behind a public URL
    pane serve --bind 0.0.0.0 --endpoint https://proxy.example.com/web-proxy

    # Use a config file and a shorter upstream timeout
    pane serve --config ./pane.json --timeout 10
")]
    Serve(ServeArgs),

    /// Fetch and rewrite one page, printing the response envelope
    #[command(after_help = "EXAMPLES:
    # Fetch a page (https:// is assumed)
    pane fetch example.com

    # Anything that does not look like an address becomes a search
    pane fetch \"rust borrow checker\"

    # Print only the rewritten document
    pane fetch https://example.com --raw
")]
    Fetch(FetchArgs),

    /// Check whether a URL would be allowed by the proxy
    #[command(after_help = "EXAMPLES:
    # Human readable decision
    pane check http://169.254.169.254/latest/meta-data/

    # JSON output for scripts
    pane check https://example.com --json
")]
    Check(CheckArgs),
}

/// Settings shared by commands that build a proxy configuration.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// JSON config file (default: ~/.config/pane/config.json when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Public URL of the proxy endpoint, embedded into rewritten pages
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Upstream fetch timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Do not resolve target hosts before connecting
    #[arg(long)]
    pub no_resolve_dns: bool,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Address to listen on
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<IpAddr>,

    /// Port to listen on (0 picks a free port)
    #[arg(long, short = 'p', value_name = "PORT")]
    pub port: Option<u16>,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// URL, bare domain, or search terms
    #[arg(value_name = "ADDRESS")]
    pub address: String,

    /// Print only the body instead of the JSON envelope
    #[arg(long)]
    pub raw: bool,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Target URL to check
    #[arg(value_name = "URL")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
