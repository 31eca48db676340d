//! Request line and header parsing.
//!
//! The protocol hands the parser one complete header block (request line
//! through the terminating blank line). Size limits are checked here so an
//! oversized block is answered with 400 rather than buffered forever.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Version};

use crate::config::ServerConfig;
use crate::server::error::{ProcessingError, ServerError};
use crate::server::message::RequestMessage;

/// Header slots offered to httparse.
const MAX_HEADER_COUNT: usize = 128;

/// Turns a header block into a [`RequestMessage`].
pub trait RequestParser: Send + Sync + 'static {
    /// Parse one header block. `ProtocolParse` errors are answered with
    /// their own status; anything else becomes a 500.
    fn parse_message(&self, head: &[u8]) -> Result<RequestMessage, ServerError>;

    /// Largest header block worth buffering before giving up.
    fn max_head_size(&self) -> usize;
}

/// httparse-backed parser with line, field and block size limits.
#[derive(Debug, Clone)]
pub struct HttpRequestParser {
    max_line_size: usize,
    max_field_size: usize,
    max_headers: usize,
}

impl Default for HttpRequestParser {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for HttpRequestParser {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_line_size: config.max_line_size,
            max_field_size: config.max_field_size,
            max_headers: config.max_headers,
        }
    }
}

impl HttpRequestParser {
    fn check_sizes(&self, head: &[u8]) -> Result<(), ProcessingError> {
        if head.len() > self.max_headers {
            return Err(ProcessingError::bad_request(format!(
                "Got more than {} bytes when reading headers",
                self.max_headers
            )));
        }

        let mut lines = head.split(|&b| b == b'\n');
        if let Some(request_line) = lines.next() {
            if request_line.len() > self.max_line_size + 1 {
                return Err(ProcessingError::bad_request(format!(
                    "Request line is too long (limit {})",
                    self.max_line_size
                )));
            }
        }
        for line in lines {
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                continue;
            };
            if colon > self.max_line_size {
                return Err(ProcessingError::bad_request(format!(
                    "Header name is too long (limit {})",
                    self.max_line_size
                )));
            }
            if line.len() - colon > self.max_field_size + 2 {
                return Err(ProcessingError::bad_request(format!(
                    "Header value is too long (limit {})",
                    self.max_field_size
                )));
            }
        }
        Ok(())
    }
}

impl RequestParser for HttpRequestParser {
    fn parse_message(&self, head: &[u8]) -> Result<RequestMessage, ServerError> {
        self.check_sizes(head)?;

        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADER_COUNT];
        let mut request = httparse::Request::new(&mut slots);
        match request.parse(head) {
            Ok(httparse::Status::Complete(_)) => {}
            Ok(httparse::Status::Partial) => {
                return Err(ProcessingError::bad_request("Incomplete request head").into())
            }
            Err(httparse::Error::TooManyHeaders) => {
                return Err(ProcessingError::bad_request("Too many headers").into())
            }
            Err(e) => return Err(ProcessingError::bad_request(format!("Bad request: {e}")).into()),
        }

        let method = request
            .method
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .ok_or_else(|| ProcessingError::bad_request("Bad request method"))?;
        let path = request
            .path
            .ok_or_else(|| ProcessingError::bad_request("Missing request target"))?
            .to_string();
        let version = match request.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            _ => return Err(ProcessingError::bad_request("Bad HTTP version").into()),
        };

        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for header in request.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|_| ProcessingError::invalid_header(header.name))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|_| ProcessingError::invalid_header(header.name))?;
            headers.append(name, value);
        }

        Ok(RequestMessage::new(method, path, version, headers))
    }

    fn max_head_size(&self) -> usize {
        self.max_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(result: Result<RequestMessage, ServerError>) -> u16 {
        match result {
            Err(ServerError::ProtocolParse(e)) => e.status,
            other => panic!("expected processing error, got {other:?}"),
        }
    }

    #[test]
    fn parses_request_head() {
        let parser = HttpRequestParser::default();
        let message = parser
            .parse_message(b"POST /submit?x=1 HTTP/1.1\r\nHost: a\r\nContent-Length: 3\r\n\r\n")
            .unwrap();
        assert_eq!(message.method, Method::POST);
        assert_eq!(message.path, "/submit?x=1");
        assert_eq!(message.version, Version::HTTP_11);
        assert_eq!(message.headers["content-length"], "3");
        assert!(message.keep_alive());
    }

    #[test]
    fn malformed_request_line_is_400() {
        let parser = HttpRequestParser::default();
        assert_eq!(status_of(parser.parse_message(b"GARBAGE\r\n\r\n")), 400);
        assert_eq!(status_of(parser.parse_message(b"GET / HTTP/2.0\r\n\r\n")), 400);
    }

    #[test]
    fn enforces_size_limits() {
        let parser = HttpRequestParser::from(&ServerConfig {
            max_line_size: 16,
            max_field_size: 8,
            max_headers: 128,
            ..ServerConfig::default()
        });
        assert!(parser.parse_message(b"GET / HTTP/1.1\r\nA: short\r\n\r\n").is_ok());
        assert_eq!(
            status_of(parser.parse_message(b"GET /a-very-long-path HTTP/1.1\r\n\r\n")),
            400
        );
        assert_eq!(
            status_of(parser.parse_message(b"GET / HTTP/1.1\r\nA: much-too-long\r\n\r\n")),
            400
        );

        let mut big = b"GET / HTTP/1.1\r\n".to_vec();
        for _ in 0..20 {
            big.extend_from_slice(b"A: b\r\n");
        }
        big.extend_from_slice(b"\r\n");
        assert_eq!(status_of(parser.parse_message(&big)), 400);
    }
}
