//! Content proxy server for pane.
//!
//! `pane-proxy` fetches public web pages on behalf of a browser front end
//! and returns them rewritten so that every resource the page loads goes
//! back through the proxy.
//!
//! - **POST** `{"url": "..."}` returns a JSON envelope with the rewritten
//!   document (`pipeline`, `response`).
//! - **GET** `?url=...` returns the raw resource, which is what rewritten
//!   pages point their images, scripts and stylesheets at.
//! - **OPTIONS** answers the CORS preflight.
//!
//! Targets are validated before any network activity, and again at every
//! redirect hop (`fetch`). With DNS checking on, names are resolved and the
//! connection is pinned to the checked addresses (`filter`).

pub mod audit;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod http;
pub mod pipeline;
pub mod response;
pub mod server;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use fetch::{FetchError, FetchResult, Fetcher, Upstream};
pub use pipeline::{Outcome, Pipeline};
pub use response::{ProxyResponse, Reply};
pub use server::{start, start_with_upstream, ProxyHandle};
