//! pane CLI - rewriting content proxy
//!
//! This is the CLI binary that serves the pane proxy and runs one-shot
//! fetches and URL checks against it.

mod address;
mod cli;
mod config;
mod output;

use clap::Parser;
use cli::{CheckArgs, Cli, Commands, FetchArgs, ServeArgs};
use colored::Colorize;
use pane::Validator;
use pane_proxy::{Fetcher, Pipeline, ProxyError, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run() {
        error!("{}", e);
        eprintln!("pane: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            output::print_banner(cli.silent);
            run_serve(args, cli.silent)
        }
        Commands::Fetch(args) => run_fetch(args),
        Commands::Check(args) => run_check(args),
    }
}

/// Multi-thread runtime, so connection tasks are driven by worker threads
/// while the main thread waits for Ctrl-C.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ProxyError::Io)
}

/// Serve until interrupted
fn run_serve(args: ServeArgs, silent: bool) -> Result<()> {
    let mut config = config::resolve(&args.config)?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }

    let rt = runtime()?;
    rt.block_on(async {
        let handle = pane_proxy::start(config.clone()).await?;
        output::print_serving(&handle.addr, &config, silent);

        tokio::signal::ctrl_c().await?;
        info!("Interrupted, shutting down");
        handle.shutdown();
        Ok::<(), ProxyError>(())
    })
}

/// Run one address through the pipeline and print the result
fn run_fetch(args: FetchArgs) -> Result<()> {
    let config = config::resolve(&args.config)?;
    let Some(target) = address::normalize_address(&args.address) else {
        return Err(ProxyError::Config("address is empty".to_string()));
    };
    info!("Fetching {}", target);

    // Without a server there is no Host header; links point at the
    // configured endpoint or the default listening address.
    let endpoint = config.public_endpoint.clone().unwrap_or_else(|| {
        format!(
            "http://{}/",
            std::net::SocketAddr::new(config.bind_addr, config.bind_port)
        )
    });

    let rt = runtime()?;
    let reply = rt.block_on(async {
        let fetcher = Fetcher::new(&config)?;
        let pipeline = Pipeline::new(Validator::new(config.host_filter()), Arc::new(fetcher));
        let body = serde_json::json!({ "url": target }).to_string();
        Ok::<_, ProxyError>(pipeline.handle_envelope(body.as_bytes(), &endpoint).await)
    })?;

    let envelope: pane_proxy::ProxyResponse =
        serde_json::from_slice(&reply.body).unwrap_or_default();
    let ok = reply.status == 200 && envelope.success == Some(true);

    if args.raw {
        if let Some(html) = &envelope.html {
            println!("{}", html);
        }
    } else {
        println!("{}", String::from_utf8_lossy(&reply.body));
    }

    if !ok {
        let message = envelope.error.unwrap_or_else(|| "fetch failed".to_string());
        eprintln!("{} {} ({})", "pane:".red(), message, reply.status);
        std::process::exit(1);
    }
    Ok(())
}

/// Print the validator decision for a URL
fn run_check(args: CheckArgs) -> Result<()> {
    let config = config::resolve(&args.config)?;
    let validation = Validator::new(config.host_filter()).validate(&args.url);

    if args.json {
        println!("{}", output::check_json(&args.url, &validation));
    } else {
        output::print_check(&args.url, &validation);
    }

    if !validation.is_allowed() {
        std::process::exit(1);
    }
    Ok(())
}
