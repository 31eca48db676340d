//! Ordered response writing.
//!
//! Handlers on one connection run concurrently, but HTTP/1.1 needs
//! responses on the wire in request order. Each dispatched request reserves
//! a slot here, in parse order; a single task owns the write half and waits
//! on the slots one at a time.
//!
//! # Data Flow
//! ```text
//! dispatch (parse order) → reserve() → slot N ──┐
//! handler N finishes    → slot N.send(bytes)    │
//!                                               ▼
//!                           writer task: await slot 1, 2, ... → write_all
//! ```
//!
//! The writer half-closes the socket after a response marked `close`, or
//! when a slot is dropped without a response (cancelled handler).

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::server::protocol::Shared;

/// One serialized response.
#[derive(Debug)]
pub(crate) struct Outgoing {
    pub(crate) bytes: Bytes,
    /// Stop writing and half-close after this response.
    pub(crate) close: bool,
}

pub(crate) type Slot = oneshot::Sender<Outgoing>;

/// Handle for reserving response slots on one connection.
#[derive(Debug)]
pub(crate) struct ResponseWriter {
    slots: mpsc::UnboundedSender<oneshot::Receiver<Outgoing>>,
}

impl ResponseWriter {
    pub(crate) fn spawn<W>(write: W, shared: Arc<Shared>) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_responses(write, rx, shared));
        (Self { slots: tx }, task)
    }

    /// Reserve the next position in the response order. `None` once the
    /// writer has stopped.
    pub(crate) fn reserve(&self) -> Option<Slot> {
        let (tx, rx) = oneshot::channel();
        self.slots.send(rx).ok()?;
        Some(tx)
    }
}

async fn write_responses<W>(
    mut write: W,
    mut slots: mpsc::UnboundedReceiver<oneshot::Receiver<Outgoing>>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(slot) = slots.recv().await {
        let Ok(outgoing) = slot.await else {
            tracing::debug!(connection_id = %shared.id(), "Response slot abandoned, closing");
            break;
        };

        let written = match write.write_all(&outgoing.bytes).await {
            Ok(()) => write.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!(
                connection_id = %shared.id(),
                error = %e,
                "Ignored premature client disconnection"
            );
            shared.set_closing();
            return;
        }

        if outgoing.close {
            break;
        }
    }

    shared.set_closing();
    if let Err(e) = write.shutdown().await {
        tracing::trace!(connection_id = %shared.id(), error = %e, "Half-close failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use tokio::io::AsyncReadExt;

    fn outgoing(text: &'static str, close: bool) -> Outgoing {
        Outgoing {
            bytes: Bytes::from_static(text.as_bytes()),
            close,
        }
    }

    #[tokio::test]
    async fn writes_in_reservation_order() {
        let (client, server) = tokio::io::duplex(1024);
        let shared = Arc::new(Shared::new(ConnectionId::new()));
        let (writer, task) = ResponseWriter::spawn(server, shared.clone());

        let first = writer.reserve().unwrap();
        let second = writer.reserve().unwrap();
        second.send(outgoing("two;", false)).unwrap();
        first.send(outgoing("one;", false)).unwrap();
        drop(writer);
        task.await.unwrap();

        let mut client = client;
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "one;two;");
        assert!(shared.is_closing());
    }

    #[tokio::test]
    async fn stops_after_close_response() {
        let (mut client, server) = tokio::io::duplex(1024);
        let shared = Arc::new(Shared::new(ConnectionId::new()));
        let (writer, task) = ResponseWriter::spawn(server, shared);

        writer.reserve().unwrap().send(outgoing("bye", true)).unwrap();
        let late = writer.reserve();
        task.await.unwrap();

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "bye");
        if let Some(late) = late {
            assert!(late.send(outgoing("late", false)).is_err());
        }
        assert!(writer.reserve().is_none());
    }

    #[tokio::test]
    async fn abandoned_slot_half_closes() {
        let (mut client, server) = tokio::io::duplex(1024);
        let shared = Arc::new(Shared::new(ConnectionId::new()));
        let (writer, task) = ResponseWriter::spawn(server, shared);

        drop(writer.reserve().unwrap());
        task.await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }
}
