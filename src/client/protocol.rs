//! Client-side protocol state carried alongside a pooled transport.
//!
//! # Responsibilities
//! - Buffer inbound bytes read from the transport, tracking end-of-stream
//! - Record how the last response was framed (keep-alive or close)
//! - Parse response heads (used for proxy CONNECT replies)
//!
//! The pool consults this state on release: a transport whose last response
//! demanded close, or whose buffer still holds bytes nobody consumed, is not
//! reused.

use bytes::{Buf, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH};
use http::HeaderMap;
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_RESPONSE_HEADERS: usize = 64;
const READ_CHUNK: usize = 8 * 1024;

/// How the most recent response on this transport was framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFraming {
    /// No response has been read since the last reset.
    #[default]
    NoResponse,
    /// A response started but was not read to completion.
    Incomplete,
    /// The response completed and allows reuse.
    KeepAlive,
    /// The response completed but requires the connection to close.
    Close,
}

/// A parsed response status line and headers.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: u8,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Whether the response forbids reusing the connection.
    pub fn should_close(&self) -> bool {
        let connection = self
            .headers
            .get(CONNECTION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        match connection.as_deref() {
            Some(v) if v.contains("close") => true,
            Some(v) if v.contains("keep-alive") => false,
            _ => self.version == 0,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Errors reading a response head.
#[derive(Debug, thiserror::Error)]
pub enum ResponseHeadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response head: {0}")]
    Parse(#[from] httparse::Error),
    #[error("invalid header: {0}")]
    Header(String),
    #[error("connection closed before response head completed")]
    UnexpectedEof,
    #[error("response head exceeds {0} bytes")]
    TooLarge(usize),
}

/// Buffered input plus response framing for one client transport.
#[derive(Debug, Default)]
pub struct ProtocolState {
    buffer: BytesMut,
    eof: bool,
    framing: ResponseFraming,
}

impl ProtocolState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes read from the transport but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Input arrived that nobody drained and the stream has not ended.
    pub fn has_unconsumed_input(&self) -> bool {
        !self.buffer.is_empty() && !self.eof
    }

    pub fn framing(&self) -> ResponseFraming {
        self.framing
    }

    pub fn set_framing(&mut self, framing: ResponseFraming) {
        self.framing = framing;
    }

    /// Mark the response described by `head` as fully read.
    pub fn finish_response(&mut self, head: &ResponseHead) {
        self.framing = if head.should_close() {
            ResponseFraming::Close
        } else {
            ResponseFraming::KeepAlive
        };
    }

    /// Whether response framing rules out reuse.
    pub fn should_close(&self) -> bool {
        matches!(
            self.framing,
            ResponseFraming::Incomplete | ResponseFraming::Close
        )
    }

    /// Forget the previous exchange so the transport is clean for reuse.
    pub fn reset_parser(&mut self) {
        self.framing = ResponseFraming::NoResponse;
    }

    /// Read more bytes from `reader` into the buffer. Returns 0 at EOF.
    pub async fn fill<R>(&mut self, reader: &mut R) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.buffer.reserve(READ_CHUNK);
        let n = reader.read_buf(&mut self.buffer).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    /// Take up to `max` buffered bytes.
    pub fn take(&mut self, max: usize) -> Bytes {
        let n = max.min(self.buffer.len());
        self.buffer.split_to(n).freeze()
    }

    /// Discard `n` buffered bytes that were parsed in place.
    pub fn consume(&mut self, n: usize) {
        self.buffer.advance(n.min(self.buffer.len()));
    }

    /// Copy buffered bytes into `dst`, returning how many were copied.
    pub(crate) fn drain_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.buffer.len());
        dst[..n].copy_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        n
    }

    /// Try to parse a complete response head out of the buffer.
    pub fn parse_response_head(&mut self) -> Result<Option<ResponseHead>, ResponseHeadError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
        let mut response = httparse::Response::new(&mut headers);
        let consumed = match response.parse(&self.buffer)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Ok(None),
        };

        let mut map = HeaderMap::with_capacity(response.headers.len());
        for header in response.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| ResponseHeadError::Header(e.to_string()))?;
            let value = HeaderValue::from_bytes(header.value)
                .map_err(|e| ResponseHeadError::Header(e.to_string()))?;
            map.append(name, value);
        }
        let head = ResponseHead {
            version: response.version.unwrap_or(1),
            status: response.code.unwrap_or_default(),
            reason: response.reason.unwrap_or_default().to_string(),
            headers: map,
        };

        self.buffer.advance(consumed);
        self.framing = ResponseFraming::Incomplete;
        Ok(Some(head))
    }

    /// Read from `reader` until a full response head is buffered.
    pub async fn read_response_head<R>(
        &mut self,
        reader: &mut R,
        max_size: usize,
    ) -> Result<ResponseHead, ResponseHeadError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        loop {
            if let Some(head) = self.parse_response_head()? {
                return Ok(head);
            }
            if self.buffer.len() > max_size {
                return Err(ResponseHeadError::TooLarge(max_size));
            }
            if self.fill(reader).await? == 0 {
                return Err(ResponseHeadError::UnexpectedEof);
            }
        }
    }
}
