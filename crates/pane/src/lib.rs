//! Core library for the pane content proxy.
//!
//! Two pure building blocks, with no I/O of their own:
//!
//! - [`validate`] / [`net_filter`]: decide whether a target URL may be
//!   fetched at all (scheme allow-list, internal-address deny list).
//! - [`rewrite`]: turn a fetched HTML document into one whose resource
//!   references all route back through the proxy endpoint.
//!
//! The network side (fetching, the HTTP endpoint) lives in `pane-proxy`.

pub mod net_filter;
pub mod rewrite;
pub mod validate;

pub use net_filter::{FilterResult, HostFilter};
pub use rewrite::{rewrite, ProxyLinker, RewriteError};
pub use validate::{validate, Rejection, Validation, Validator};
