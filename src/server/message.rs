//! Parsed request envelopes.

use http::header::{CONNECTION, TRANSFER_ENCODING, UPGRADE};
use http::{HeaderMap, Method, Version};

/// Request line and headers of one pipelined request.
#[derive(Debug, Clone)]
pub struct RequestMessage {
    pub method: Method,
    /// Request-target exactly as sent.
    pub path: String,
    pub version: Version,
    pub headers: HeaderMap,
    /// The client asked for the connection to close after this request.
    pub should_close: bool,
    /// `Connection: upgrade` with an `Upgrade` header.
    pub upgrade: bool,
    /// `Transfer-Encoding` ends in `chunked`.
    pub chunked: bool,
}

impl RequestMessage {
    /// Derive the connection flags from the headers.
    pub fn new(method: Method, path: String, version: Version, headers: HeaderMap) -> Self {
        let connection = header_tokens(&headers, CONNECTION);
        let should_close = if connection.iter().any(|t| t == "close") {
            true
        } else if connection.iter().any(|t| t == "keep-alive") {
            false
        } else {
            version < Version::HTTP_11
        };
        let upgrade = connection.iter().any(|t| t == "upgrade") && headers.contains_key(UPGRADE);
        let chunked = header_tokens(&headers, TRANSFER_ENCODING)
            .last()
            .is_some_and(|t| t == "chunked");

        Self {
            method,
            path,
            version,
            headers,
            should_close,
            upgrade,
            chunked,
        }
    }

    pub fn keep_alive(&self) -> bool {
        !self.should_close
    }
}

/// Comma-separated, lower-cased tokens across every value of `name`.
fn header_tokens(headers: &HeaderMap, name: http::header::HeaderName) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
