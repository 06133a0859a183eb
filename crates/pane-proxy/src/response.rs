//! Response envelope and raw HTTP reply serialization.
//!
//! Every reply the server writes, success or error, carries the same
//! permissive CORS headers so the browser front end can read it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// How `html` is encoded in a [`ProxyResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Base64,
}

/// JSON body returned for POST requests and for errors.
///
/// Successful fetches set `success: true` and `html`. A fetch that reached
/// the site but got a non-2xx status sets `success: false` and `error`.
/// Requests refused before fetching carry only `error`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProxyResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<BodyEncoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProxyResponse {
    /// A fetched document or text body.
    #[must_use]
    pub fn page(html: String) -> Self {
        Self {
            success: Some(true),
            html: Some(html),
            ..Default::default()
        }
    }

    /// A fetched binary body, base64 encoded.
    #[must_use]
    pub fn binary(body: &[u8]) -> Self {
        Self {
            success: Some(true),
            html: Some(BASE64.encode(body)),
            encoding: Some(BodyEncoding::Base64),
            ..Default::default()
        }
    }

    /// The site answered with a non-2xx status.
    #[must_use]
    pub fn upstream_status(status: u16) -> Self {
        Self {
            success: Some(false),
            error: Some(format!("Failed to load page: {status}")),
            ..Default::default()
        }
    }

    /// The request was refused or failed.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// One HTTP response, ready to be written to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Reply {
    /// JSON envelope reply.
    #[must_use]
    pub fn json(status: u16, response: &ProxyResponse) -> Self {
        // Serializing a struct of strings cannot fail.
        let body = serde_json::to_vec(response).unwrap_or_else(|_| b"{}".to_vec());
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body,
        }
    }

    /// JSON error reply.
    #[must_use]
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, &ProxyResponse::error(message))
    }

    /// Reply to a CORS preflight: headers only.
    #[must_use]
    pub fn preflight() -> Self {
        Self {
            status: 200,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Raw body passed through with its own content type.
    #[must_use]
    pub fn raw(status: u16, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        let content_type = content_type.into();
        Self {
            status,
            content_type: (!content_type.is_empty()).then_some(content_type),
            body,
        }
    }

    /// Serialize as an HTTP/1.1 response. The connection is closed after it.
    #[must_use]
    pub fn to_http(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n\
             Access-Control-Allow-Origin: {}\r\n\
             Access-Control-Allow-Headers: {}\r\n",
            self.status,
            reason_phrase(self.status),
            ALLOW_ORIGIN,
            ALLOW_HEADERS,
        );
        if let Some(content_type) = &self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        ));

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        410 => "Gone",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}
