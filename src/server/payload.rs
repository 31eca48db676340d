//! Request body streams.
//!
//! # Data Flow
//! ```text
//! connection task                         handler task
//!   socket bytes                            Payload::read_any
//!     → BodyDecoder (length | chunked | eof)     ▲
//!     → PayloadSender ── bounded channel ────────┘
//! ```
//!
//! The channel is bounded: when a handler stops reading, the connection
//! stops pulling bytes off the socket. `is_eof` reports whether the whole
//! body has arrived, independent of how much the handler has read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::net::chunked::{DechunkError, Dechunker};

/// Chunks buffered between the connection and the handler.
pub(crate) const PAYLOAD_CHANNEL_CAPACITY: usize = 16;

/// Errors reading a request body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("connection closed before the request body completed")]
    Incomplete,
    #[error("malformed chunked body: {0}")]
    Chunked(#[from] DechunkError),
}

pub(crate) type Item = Result<Bytes, PayloadError>;

/// The body of one request.
#[derive(Debug)]
pub struct Payload {
    rx: Option<mpsc::Receiver<Item>>,
    complete: Arc<AtomicBool>,
}

impl Payload {
    /// A body with no bytes that is already at end of stream.
    pub fn empty() -> Self {
        Self {
            rx: None,
            complete: Arc::new(AtomicBool::new(true)),
        }
    }

    pub(crate) fn channel() -> (PayloadSender, Payload) {
        let (tx, rx) = mpsc::channel(PAYLOAD_CHANNEL_CAPACITY);
        let complete = Arc::new(AtomicBool::new(false));
        (
            PayloadSender {
                tx,
                complete: complete.clone(),
            },
            Payload {
                rx: Some(rx),
                complete,
            },
        )
    }

    /// Whether the entire body has been received from the peer.
    pub fn is_eof(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Next chunk of body bytes, or `None` at the end.
    pub async fn read_any(&mut self) -> Result<Option<Bytes>, PayloadError> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };
        match rx.recv().await {
            Some(item) => item.map(Some),
            None if self.complete.load(Ordering::Acquire) => {
                self.rx = None;
                Ok(None)
            }
            None => Err(PayloadError::Incomplete),
        }
    }

    /// Read the rest of the body into one buffer.
    pub async fn read_to_end(&mut self) -> Result<Bytes, PayloadError> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.read_any().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

/// The connection's end of a [`Payload`].
#[derive(Debug)]
pub(crate) struct PayloadSender {
    tx: mpsc::Sender<Item>,
    complete: Arc<AtomicBool>,
}

impl PayloadSender {
    pub(crate) fn sender(&self) -> mpsc::Sender<Item> {
        self.tx.clone()
    }

    /// Queue a chunk without waiting.
    pub(crate) fn try_send(&self, chunk: Bytes) -> Result<(), mpsc::error::TrySendError<Item>> {
        self.tx.try_send(Ok(chunk))
    }

    /// Mark the body complete; the reader sees end of stream after the
    /// buffered chunks.
    pub(crate) fn finish(self) {
        self.complete.store(true, Ordering::Release);
    }

    /// Abort the body; the reader gets `err` once buffered chunks drain.
    pub(crate) fn fail(self, err: PayloadError) {
        let _ = self.tx.try_send(Err(err));
    }
}

/// How the body of a request is delimited on the wire.
#[derive(Debug)]
pub(crate) enum BodyDecoder {
    Length(u64),
    Chunked(Dechunker),
    /// CONNECT and upgraded connections: everything until the peer closes.
    UntilEof,
}

impl BodyDecoder {
    /// Decode body bytes off the front of `buf`. Returns the decoded chunk
    /// (possibly empty) and whether the body is complete.
    pub(crate) fn decode(&mut self, buf: &mut BytesMut) -> Result<(Bytes, bool), PayloadError> {
        match self {
            BodyDecoder::Length(remaining) => {
                let n = usize::try_from(*remaining)
                    .unwrap_or(usize::MAX)
                    .min(buf.len());
                *remaining -= n as u64;
                Ok((buf.split_to(n).freeze(), *remaining == 0))
            }
            BodyDecoder::Chunked(dechunker) => {
                let mut out = BytesMut::new();
                let used = dechunker.decode(buf, &mut out)?;
                let _ = buf.split_to(used);
                Ok((out.freeze(), dechunker.is_ended()))
            }
            BodyDecoder::UntilEof => Ok((buf.split().freeze(), false)),
        }
    }

    /// The peer closed: only read-until-close bodies end cleanly.
    pub(crate) fn completes_at_eof(&self) -> bool {
        matches!(self, BodyDecoder::UntilEof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_payload_is_eof() {
        let mut payload = Payload::empty();
        assert!(payload.is_eof());
        assert_eq!(payload.read_any().await, Ok(None));
    }

    #[tokio::test]
    async fn chunks_then_end() {
        let (sender, mut payload) = Payload::channel();
        sender.sender().send(Ok(Bytes::from_static(b"ab"))).await.unwrap();
        sender.sender().send(Ok(Bytes::from_static(b"cd"))).await.unwrap();
        assert!(!payload.is_eof());
        sender.finish();

        assert!(payload.is_eof());
        assert_eq!(payload.read_to_end().await.unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(payload.read_any().await, Ok(None));
    }

    #[tokio::test]
    async fn dropped_sender_without_finish_is_incomplete() {
        let (sender, mut payload) = Payload::channel();
        drop(sender);
        assert_eq!(payload.read_any().await, Err(PayloadError::Incomplete));
    }

    #[test]
    fn length_decoder_stops_at_boundary() {
        let mut decoder = BodyDecoder::Length(3);
        let mut buf = BytesMut::from(&b"ab"[..]);
        let (chunk, done) = decoder.decode(&mut buf).unwrap();
        assert_eq!((&chunk[..], done), (&b"ab"[..], false));
        let mut buf = BytesMut::from(&b"cGET /"[..]);
        let (chunk, done) = decoder.decode(&mut buf).unwrap();
        assert_eq!((&chunk[..], done), (&b"c"[..], true));
        assert_eq!(&buf[..], b"GET /");
    }

    #[test]
    fn chunked_decoder_leaves_next_request() {
        let mut decoder = BodyDecoder::Chunked(Dechunker::new());
        let mut buf = BytesMut::from(&b"2\r\nhi\r\n0\r\n\r\nGET /"[..]);
        let (chunk, done) = decoder.decode(&mut buf).unwrap();
        assert_eq!(&chunk[..], b"hi");
        assert!(done);
        assert_eq!(&buf[..], b"GET /");
    }
}
