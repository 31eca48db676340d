//! Single-use connection handles.
//!
//! A [`Connection`] binds one acquired transport to the pool it came from.
//! It ends in exactly one of three ways:
//!
//! ```text
//!            ┌── release() ──► pool decides reuse vs close ──► Released
//! Active ────┼── close()   ──► transport closed             ──► Closed
//!            └── detach()  ──► transport handed to caller    ──► Detached
//! ```
//!
//! Calls on a non-active handle are no-ops. Dropping an active handle is a
//! leak: the transport is closed through the pool and a warning is logged.

use std::io;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::client::key::ConnectionKey;
use crate::client::protocol::{ProtocolState, ResponseFraming, ResponseHead, ResponseHeadError};
use crate::client::request::ClientRequest;
use crate::net::chunked::{Dechunker, DechunkError};
use crate::net::transport::PoolTransport;

const MAX_RESPONSE_HEAD: usize = 64 * 1024;

/// The pool side of a handle: receives transports back on release.
pub(crate) trait Release<T>: Send + Sync {
    fn release(&self, key: &ConnectionKey, transport: T, protocol: ProtocolState, should_close: bool);
}

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    Released,
    Closed,
    Detached,
}

/// An acquired transport bound to its pool.
#[must_use = "a connection must be released, closed or detached"]
pub struct Connection<T: PoolTransport> {
    key: ConnectionKey,
    request: ClientRequest,
    transport: Option<T>,
    protocol: ProtocolState,
    pool: Option<Weak<dyn Release<T>>>,
    state: HandleState,
}

impl<T: PoolTransport> Connection<T> {
    pub(crate) fn new(
        request: ClientRequest,
        transport: T,
        protocol: ProtocolState,
        pool: Weak<dyn Release<T>>,
    ) -> Self {
        Self {
            key: request.key(),
            request,
            transport: Some(transport),
            protocol,
            pool: Some(pool),
            state: HandleState::Active,
        }
    }

    /// A handle with no pool behind it; release always closes.
    pub fn standalone(request: ClientRequest, transport: T) -> Self {
        Self {
            key: request.key(),
            request,
            transport: Some(transport),
            protocol: ProtocolState::new(),
            pool: None,
            state: HandleState::Active,
        }
    }

    /// Pool bucket this connection belongs to.
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// The request the connection was opened for.
    pub fn request(&self) -> &ClientRequest {
        &self.request
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Whether the handle still owns its transport.
    pub fn is_active(&self) -> bool {
        self.state == HandleState::Active
    }

    /// Buffered input and response framing for the transport.
    pub fn protocol(&self) -> &ProtocolState {
        &self.protocol
    }

    /// Mutable protocol state, e.g. to record response framing.
    pub fn protocol_mut(&mut self) -> &mut ProtocolState {
        &mut self.protocol
    }

    /// The bound transport while active.
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Transport and protocol state together, for reads that fill the buffer.
    pub fn parts_mut(&mut self) -> Option<(&mut T, &mut ProtocolState)> {
        let transport = self.transport.as_mut()?;
        Some((transport, &mut self.protocol))
    }

    /// Return the transport to the pool for a reuse-or-close decision.
    pub fn release(&mut self) {
        self.finish(HandleState::Released, false);
    }

    /// Close the transport without returning it for reuse.
    pub fn close(&mut self) {
        self.finish(HandleState::Closed, true);
    }

    /// Give up the transport without closing it.
    pub fn detach(&mut self) -> Option<T> {
        if self.state != HandleState::Active {
            return None;
        }
        self.state = HandleState::Detached;
        self.pool = None;
        self.transport.take()
    }

    fn finish(&mut self, next: HandleState, should_close: bool) {
        if self.state != HandleState::Active {
            return;
        }
        self.state = next;
        let Some(transport) = self.transport.take() else {
            return;
        };
        let protocol = std::mem::take(&mut self.protocol);
        match self.pool.take().and_then(|pool| pool.upgrade()) {
            Some(pool) => pool.release(&self.key, transport, protocol, should_close),
            None => transport.close(),
        }
    }
}

impl<T> Connection<T>
where
    T: PoolTransport + AsyncRead + AsyncWrite + Unpin,
{
    /// Write the request line and headers for the bound request.
    pub async fn send_request(&mut self, body: &[u8]) -> io::Result<()> {
        let head = self.request.head_bytes();
        let transport = self.transport.as_mut().ok_or_else(not_active)?;
        transport.write_all(&head).await?;
        if !body.is_empty() {
            transport.write_all(body).await?;
        }
        transport.flush().await
    }

    /// Read a response head, leaving the body buffered.
    pub async fn read_response_head(&mut self) -> Result<ResponseHead, ResponseHeadError> {
        let (transport, protocol) = self
            .parts_mut()
            .ok_or_else(|| ResponseHeadError::Io(not_active()))?;
        protocol.read_response_head(transport, MAX_RESPONSE_HEAD).await
    }

    /// Read a full response and record its framing for the pool.
    ///
    /// Bodies without a length or chunked framing are read to end of stream,
    /// which rules out reuse.
    pub async fn read_response(&mut self) -> Result<(ResponseHead, Bytes), ResponseHeadError> {
        let head = self.read_response_head().await?;
        let bodyless = head.status / 100 == 1
            || head.status == 204
            || head.status == 304
            || self.request.method == http::Method::HEAD;
        let (transport, protocol) = self
            .parts_mut()
            .ok_or_else(|| ResponseHeadError::Io(not_active()))?;

        let body = if bodyless {
            Bytes::new()
        } else if is_chunked(&head) {
            let mut dechunker = Dechunker::new();
            let mut out = bytes::BytesMut::new();
            loop {
                let used = dechunker
                    .decode(protocol.buffered(), &mut out)
                    .map_err(|e: DechunkError| ResponseHeadError::Header(e.to_string()))?;
                protocol.consume(used);
                if dechunker.is_ended() {
                    break;
                }
                if protocol.fill(transport).await? == 0 {
                    return Err(ResponseHeadError::UnexpectedEof);
                }
            }
            out.freeze()
        } else if let Some(length) = head.content_length() {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            while protocol.buffered().len() < length {
                if protocol.fill(transport).await? == 0 {
                    return Err(ResponseHeadError::UnexpectedEof);
                }
            }
            protocol.take(length)
        } else {
            while protocol.fill(transport).await? > 0 {}
            protocol.set_framing(ResponseFraming::Close);
            return Ok((head, protocol.take(usize::MAX)));
        };

        protocol.finish_response(&head);
        Ok((head, body))
    }
}

fn is_chunked(head: &ResponseHead) -> bool {
    head.headers
        .get_all(http::header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("chunked"))
}

fn not_active() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is not active")
}

impl<T: PoolTransport> Drop for Connection<T> {
    fn drop(&mut self) {
        if self.state == HandleState::Active {
            tracing::warn!(key = %self.key, "Unclosed connection");
            self.finish(HandleState::Closed, true);
        }
    }
}

impl<T: PoolTransport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("state", &self.state)
            .finish()
    }
}

impl<T> AsyncRead for Connection<T>
where
    T: PoolTransport + AsyncRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.protocol.buffered().is_empty() {
            let n = this.protocol.drain_into(buf.initialize_unfilled());
            buf.advance(n);
            return Poll::Ready(Ok(()));
        }
        match this.transport.as_mut() {
            Some(transport) => Pin::new(transport).poll_read(cx, buf),
            None => Poll::Ready(Err(not_active())),
        }
    }
}

impl<T> AsyncWrite for Connection<T>
where
    T: PoolTransport + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().transport.as_mut() {
            Some(transport) => Pin::new(transport).poll_write(cx, buf),
            None => Poll::Ready(Err(not_active())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().transport.as_mut() {
            Some(transport) => Pin::new(transport).poll_flush(cx),
            None => Poll::Ready(Err(not_active())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().transport.as_mut() {
            Some(transport) => Pin::new(transport).poll_shutdown(cx),
            None => Poll::Ready(Err(not_active())),
        }
    }
}
