//! Byte-stream transports shared by the pool and the server.
//!
//! # Responsibilities
//! - One stream type covering plain TCP, client TLS over TCP, and unix sockets
//! - Liveness probing for idle pooled streams
//! - Explicit close hook for streams leaving the pool

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::client::TlsStream;

/// A transport the connection pool can park between requests.
pub trait PoolTransport: Send + 'static {
    /// Whether the peer is still connected with no unsolicited input pending.
    ///
    /// Probing may consume a byte of unsolicited input; such a stream is
    /// reported as not connected and is never reused.
    fn is_connected(&self) -> bool;

    /// Close the transport, releasing the socket.
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// An established client or server byte stream.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Whether the stream is TLS-wrapped.
    pub fn is_secure(&self) -> bool {
        matches!(self, Stream::Tls(_))
    }

    /// Take back the raw TCP socket, e.g. to start a TLS handshake on it.
    pub fn into_tcp(self) -> Result<TcpStream, Stream> {
        match self {
            Stream::Tcp(tcp) => Ok(tcp),
            other => Err(other),
        }
    }

    /// The TCP socket underneath, if any.
    pub fn tcp(&self) -> Option<&TcpStream> {
        match self {
            Stream::Tcp(tcp) => Some(tcp),
            Stream::Tls(tls) => Some(tls.get_ref().0),
            #[cfg(unix)]
            Stream::Unix(_) => None,
        }
    }
}

/// Non-blocking liveness probe on a readiness-driven socket read.
fn probe(result: io::Result<usize>) -> bool {
    match result {
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
        // EOF, unsolicited data, or a socket error.
        _ => false,
    }
}

impl PoolTransport for TcpStream {
    fn is_connected(&self) -> bool {
        let mut byte = [0u8; 1];
        probe(self.try_read(&mut byte))
    }
}

#[cfg(unix)]
impl PoolTransport for UnixStream {
    fn is_connected(&self) -> bool {
        let mut byte = [0u8; 1];
        probe(self.try_read(&mut byte))
    }
}

impl PoolTransport for Stream {
    fn is_connected(&self) -> bool {
        match self {
            Stream::Tcp(tcp) => tcp.is_connected(),
            Stream::Tls(tls) => {
                let (tcp, session) = tls.get_ref();
                !session.is_handshaking() && tcp.is_connected()
            }
            #[cfg(unix)]
            Stream::Unix(unix) => unix.is_connected(),
        }
    }
}

#[cfg(test)]
impl PoolTransport for tokio::io::DuplexStream {
    fn is_connected(&self) -> bool {
        true
    }
}

impl From<TcpStream> for Stream {
    fn from(tcp: TcpStream) -> Self {
        Stream::Tcp(tcp)
    }
}

impl From<TlsStream<TcpStream>> for Stream {
    fn from(tls: TlsStream<TcpStream>) -> Self {
        Stream::Tls(Box::new(tls))
    }
}

#[cfg(unix)]
impl From<UnixStream> for Stream {
    fn from(unix: UnixStream) -> Self {
        Stream::Unix(unix)
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
