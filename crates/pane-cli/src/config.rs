//! Configuration loading for the pane CLI
//!
//! Sources, lowest to highest precedence:
//! - Built-in defaults ([`ProxyConfig::default`])
//! - A JSON file: `--config FILE`, else `~/.config/pane/config.json` if present
//! - CLI flags

use crate::cli::ConfigArgs;
use pane_proxy::{ProxyConfig, ProxyError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Get the user config directory path
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pane"))
}

/// Default config file location.
pub fn user_config_file() -> Option<PathBuf> {
    user_config_dir().map(|p| p.join("config.json"))
}

/// Read a JSON config file. Missing fields take their defaults.
pub fn load_file(path: &Path) -> Result<ProxyConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ProxyError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text)
        .map_err(|e| ProxyError::Config(format!("invalid config {}: {}", path.display(), e)))
}

/// Load the file layer: an explicit file must exist, the default file is
/// optional.
pub fn load(explicit: Option<&Path>) -> Result<ProxyConfig> {
    if let Some(path) = explicit {
        debug!("Loading config from {}", path.display());
        return load_file(path);
    }
    match user_config_file() {
        Some(path) if path.is_file() => {
            debug!("Loading config from {}", path.display());
            load_file(&path)
        }
        _ => Ok(ProxyConfig::default()),
    }
}

/// Apply the shared CLI flags on top of a loaded config.
pub fn apply_overrides(mut config: ProxyConfig, args: &ConfigArgs) -> ProxyConfig {
    if let Some(endpoint) = &args.endpoint {
        config.public_endpoint = Some(endpoint.clone());
    }
    if let Some(timeout) = args.timeout {
        config.request_timeout_secs = timeout;
    }
    if args.no_resolve_dns {
        config.resolve_dns = false;
    }
    config
}

/// Load, override and validate the config for a command.
pub fn resolve(args: &ConfigArgs) -> Result<ProxyConfig> {
    let config = apply_overrides(load(args.config.as_deref())?, args);
    config.validate()?;
    Ok(config)
}
