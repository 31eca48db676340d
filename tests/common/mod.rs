//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use h1_engine::config::ServerConfig;
use h1_engine::lifecycle::Shutdown;
use h1_engine::net::listener::Listener;
use h1_engine::server::{
    HttpServer, Payload, RequestHandler, RequestMessage, Response, ServerContext, ServerError,
};

/// Start a keep-alive backend answering every request with `body`.
/// Returns its address and a counter of accepted connections.
pub async fn start_keepalive_backend(body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    while let Some(end) = find_head_end(&buf) {
                        buf.drain(..end);
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: keep-alive\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        if socket.write_all(response.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
            });
        }
    });

    (addr, accepted)
}

/// Start a fake HTTP proxy. Every request head it receives is sent on the
/// returned channel and answered with `response`, then the socket closes.
pub async fn start_recording_proxy(
    response: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while find_head_end(&buf).is_none() {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Replies `path:body`; `/slow` waits first, `/ignore-body` skips the body.
#[derive(Default)]
pub struct EchoHandler {
    pub calls: AtomicUsize,
}

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(
        &self,
        message: &RequestMessage,
        payload: &mut Payload,
    ) -> Result<Response, ServerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if message.path == "/slow" {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let body = if message.path == "/ignore-body" {
            Default::default()
        } else {
            payload
                .read_to_end()
                .await
                .map_err(|_| ServerError::ClientDisconnected)?
        };
        let text = format!("{}:{}", message.path, String::from_utf8_lossy(&body));
        Ok(Response::new(200).with_body("text/plain", text))
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

/// Run an [`HttpServer`] on an ephemeral loopback port.
pub async fn start_server(config: ServerConfig, handler: Arc<dyn RequestHandler>) -> TestServer {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_listener(tcp, config.max_connections).unwrap();
    let context = ServerContext::new(&config, handler).with_access_log(None);
    let shutdown = Shutdown::new();
    let server = HttpServer::new(listener, Arc::new(context), shutdown.clone());
    let task = tokio::spawn(async move {
        server.run().await.unwrap();
    });
    TestServer {
        addr,
        shutdown,
        task,
    }
}

/// Write `request` and read until the server closes the connection.
pub async fn exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server did not close the connection")
        .unwrap();
    String::from_utf8(out).unwrap()
}
