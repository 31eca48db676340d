//! Responses and canned error pages.

use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, DATE};
use http::{HeaderMap, StatusCode, Version};

/// A complete response ready to be serialized.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    /// Reason phrase; the canonical one is used when `None`.
    pub reason: Option<String>,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Keep the connection open after this response.
    pub keep_alive: bool,
}

impl Response {
    /// An empty keep-alive response with `status`.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    /// Set the body and its `Content-Type`.
    pub fn with_body(mut self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = body.into();
        self
    }

    /// Append a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Allow or forbid reuse of the connection after this response.
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// The custom reason phrase, or the canonical one for the status.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => StatusCode::from_u16(self.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or(""),
        }
    }

    /// Status line, headers and body as written to the wire.
    ///
    /// `Content-Length`, `Connection` and `Date` are filled in when absent.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(128 + self.body.len());
        let version = if self.version == Version::HTTP_10 {
            "HTTP/1.0"
        } else {
            "HTTP/1.1"
        };
        out.put_slice(format!("{} {} {}\r\n", version, self.status, self.reason()).as_bytes());

        for (name, value) in &self.headers {
            if name == CONNECTION {
                continue;
            }
            put_header(&mut out, name.as_str(), value.as_bytes());
        }
        if !self.headers.contains_key(CONTENT_LENGTH) {
            put_header(&mut out, "content-length", self.body.len().to_string().as_bytes());
        }
        let connection: &[u8] = if self.keep_alive { b"keep-alive" } else { b"close" };
        put_header(&mut out, "connection", connection);
        if !self.headers.contains_key(DATE) {
            put_header(&mut out, "date", httpdate::fmt_http_date(SystemTime::now()).as_bytes());
        }
        out.put_slice(b"\r\n");
        out.put_slice(&self.body);
        out.freeze()
    }
}

fn put_header(out: &mut BytesMut, name: &str, value: &[u8]) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value);
    out.put_slice(b"\r\n");
}

/// Longer explanations used as error page text.
fn status_message(status: u16) -> Option<&'static str> {
    Some(match status {
        400 => "Bad request syntax or unsupported method",
        401 => "No permission -- see authorization schemes",
        403 => "Request forbidden -- authorization will not help",
        404 => "Nothing matches the given URI",
        405 => "Specified method is invalid for this resource.",
        408 => "Request timed out; try again later.",
        411 => "Client must specify Content-Length.",
        413 => "Entity is too large.",
        414 => "URI is too long.",
        431 => "The server refused this request because the request header fields are too large",
        500 => "Server got itself in trouble",
        501 => "Server does not support this operation",
        502 => "Invalid responses from another server/proxy.",
        503 => "The server cannot process the request due to a high load",
        504 => "The gateway server did not receive a timely response",
        _ => return None,
    })
}

/// Build the HTML error page for `status`.
///
/// A custom `reason` replaces both the reason phrase lookup and the page
/// text. Unknown statuses turn into `500 ???`. `trace` is escaped and
/// appended when present. Error responses always close the connection.
pub fn error_response(status: u16, reason: Option<&str>, trace: Option<&str>) -> Response {
    let canonical = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason());

    let (status, reason, mut message) = match (reason.filter(|r| !r.is_empty()), canonical) {
        (Some(reason), _) => (status, reason.to_string(), reason.to_string()),
        (None, Some(canonical)) => (
            status,
            canonical.to_string(),
            status_message(status).unwrap_or(canonical).to_string(),
        ),
        (None, None) => (500, "???".to_string(), String::new()),
    };

    if let Some(trace) = trace {
        message.push_str("<br><h2>Traceback:</h2>\n<pre>");
        message.push_str(&html_escape(trace));
        message.push_str("</pre>");
    }

    let html = format!(
        "<html>\n  <head>\n    <title>{status} {reason}</title>\n  </head>\n  <body>\n    <h1>{status} {reason}</h1>\n    {message}\n  </body>\n</html>"
    );

    let mut response = Response::new(status)
        .with_body("text/html; charset=utf-8", html)
        .with_keep_alive(false);
    response.reason = Some(reason);
    response
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
