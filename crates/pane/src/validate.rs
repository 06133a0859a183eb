//! Target URL validation.
//!
//! Every URL the proxy is asked to fetch, and every redirect hop it follows,
//! goes through [`Validator::validate`] before any network activity.

use crate::net_filter::{FilterResult, HostFilter};
use thiserror::Error;
use url::Url;

/// Why a target URL was refused.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Rejection {
    /// Not an absolute URL with a host
    #[error("Invalid URL")]
    MalformedUrl,
    /// Scheme other than `http`/`https`
    #[error("Invalid protocol")]
    InvalidProtocol,
    /// Host points at internal infrastructure
    #[error("Blocked: Cannot access internal resources")]
    BlockedHost,
}

/// Outcome of validating a target URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The URL may be fetched
    Allowed(Url),
    /// The URL was refused; `detail` explains a host block
    Rejected {
        reason: Rejection,
        detail: Option<FilterResult>,
    },
}

impl Validation {
    fn rejected(reason: Rejection) -> Self {
        Validation::Rejected {
            reason,
            detail: None,
        }
    }

    /// Whether the URL was allowed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Validation::Allowed(_))
    }

    /// Convert into a `Result`, dropping the filter detail.
    pub fn into_result(self) -> Result<Url, Rejection> {
        match self {
            Validation::Allowed(url) => Ok(url),
            Validation::Rejected { reason, .. } => Err(reason),
        }
    }
}

/// Classifies target URLs. Holds only the host filter, no state.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    filter: HostFilter,
}

impl Validator {
    #[must_use]
    pub fn new(filter: HostFilter) -> Self {
        Self { filter }
    }

    /// Parse and authorize a raw target URL.
    #[must_use]
    pub fn validate(&self, raw_url: &str) -> Validation {
        match Url::parse(raw_url.trim()) {
            Ok(url) => self.validate_url(url),
            Err(_) => Validation::rejected(Rejection::MalformedUrl),
        }
    }

    /// Authorize an already parsed URL (used for redirect hops).
    #[must_use]
    pub fn validate_url(&self, url: Url) -> Validation {
        if !matches!(url.scheme(), "http" | "https") {
            return Validation::rejected(Rejection::InvalidProtocol);
        }

        let Some(host) = url.host() else {
            return Validation::rejected(Rejection::MalformedUrl);
        };

        let result = self.filter.check_host(&host);
        if result.is_allowed() {
            Validation::Allowed(url)
        } else {
            Validation::Rejected {
                reason: Rejection::BlockedHost,
                detail: Some(result),
            }
        }
    }
}

/// Validate against the built-in deny list.
#[must_use]
pub fn validate(raw_url: &str) -> Validation {
    Validator::default().validate(raw_url)
}
